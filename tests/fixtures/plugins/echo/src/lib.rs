//! Модуль `echo`: на каждое сообщение публикует `echo:<нагрузка>`.
//!
//! Аргументы:
//! - `publish_on_create`: строка, которую модуль публикует прямо из `create`;
//! - `greeting`: строка, которую модуль публикует из хука `start`;
//! - `fail_create`: `create` возвращает ошибку.
//!
//! Все нагрузки строятся кодом этой библиотеки.

use gatemesh::{
    modules::config_as, ApiVersion, BrokerHandle, GatemeshResult, Message, Module, ModuleConfig,
    ModuleFactory, StatusCode,
};
use gatemesh_error::bail;

struct Echo {
    broker: BrokerHandle,
    greeting: Option<String>,
}

impl Module for Echo {
    fn receive(
        &self,
        message: &Message,
    ) {
        let mut payload = b"echo:".to_vec();
        payload.extend_from_slice(message.payload());
        let _ = self.broker.publish(&Message::from_payload(payload));
    }

    fn start(&self) {
        if let Some(greeting) = &self.greeting {
            let _ = self
                .broker
                .publish(&Message::from_payload(greeting.clone().into_bytes()));
        }
    }
}

#[derive(Default)]
struct EchoFactory;

impl ModuleFactory for EchoFactory {
    fn create(
        &self,
        broker: BrokerHandle,
        config: &ModuleConfig,
    ) -> GatemeshResult<Box<dyn Module>> {
        let args = config_as::<serde_json::Value>(config, broker.source())?;
        if let Some(text) = args.get("publish_on_create").and_then(|v| v.as_str()) {
            broker.publish(&Message::from_payload(text.as_bytes().to_vec()))?;
        }
        if args.get("fail_create").and_then(|v| v.as_bool()) == Some(true) {
            bail!(
                StatusCode::Internal,
                "echo '{}' configured to fail",
                broker.source()
            );
        }
        let greeting = args
            .get("greeting")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Box::new(Echo { broker, greeting }))
    }
}

gatemesh::export_module!(ApiVersion::V2, EchoFactory);
