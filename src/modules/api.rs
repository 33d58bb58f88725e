use std::{any::Any, fmt, sync::Arc};

use gatemesh_error::{ConfigError, GatemeshResult};

use crate::{BrokerHandle, Message};

/// Типизированная конфигурация модуля, полученная из `parse_configuration`.
pub type ModuleConfig = Box<dyn Any + Send + Sync>;

/// Имя символа, который экспортирует динамически загружаемая единица кода.
pub const MODULE_API_SYMBOL: &[u8] = b"gatemesh_module_api\0";

/// Имя статической строки с ABI-меткой библиотеки.
pub const MODULE_ABI_SYMBOL: &[u8] = b"GATEMESH_MODULE_ABI\0";

/// ABI-метка хоста. Плагин обязан быть собран против той же версии крейта.
pub const ABI_TAG: &str = concat!("gatemesh-", env!("CARGO_PKG_VERSION"));

/// Точка входа динамической единицы кода.
///
/// Получает максимальную версию API, которую поддерживает хост, и
/// возвращает таблицу, выделенную через `Box::into_raw`, либо null.
pub type ModuleApiEntry = unsafe fn(host_version: u32) -> *mut ModuleApi;

/// Версия контракта модуля.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ApiVersion {
    /// `parse_configuration`, `create`, `receive`, `destroy`,
    /// `free_configuration`.
    V1 = 1,
    /// Всё из V1 плюс хук `start`.
    V2 = 2,
}

impl ApiVersion {
    /// Самая новая версия, которую понимает этот хост.
    pub const CURRENT: Self = Self::V2;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn supports_start(self) -> bool {
        self >= Self::V2
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "v{}", self.as_u32())
    }
}

/// Живой экземпляр модуля: состояние, которое вернул `create`.
///
/// `receive` вызывается рабочими потоками брокера, поэтому модуль обязан
/// быть `Send + Sync` и сам охранять своё изменяемое состояние.
pub trait Module: Send + Sync {
    /// Обработка сообщения, пришедшего по связи.
    ///
    /// Сообщение заимствовано на время вызова; чтобы сохранить его дольше,
    /// модуль клонирует дескриптор. Внутри можно публиковать через
    /// [`BrokerHandle`].
    fn receive(
        &self,
        message: &Message,
    );

    /// Вызывается один раз после запуска брокера (только для
    /// [`ApiVersion::V2`]).
    fn start(&self) {}

    /// Освобождение частного состояния. Вызывается ровно один раз, когда
    /// `receive` гарантированно больше не будет вызван.
    fn destroy(self: Box<Self>) {}
}

/// Фабрика модулей: то, что загрузчик получает из единицы кода.
pub trait ModuleFactory: Send + Sync {
    /// Превращает внешнее JSON-представление в типизированную
    /// конфигурацию. По умолчанию конфигурацией становится сам JSON.
    fn parse_configuration(
        &self,
        raw: &serde_json::Value,
    ) -> GatemeshResult<ModuleConfig> {
        Ok(Box::new(raw.clone()))
    }

    /// Создаёт модуль. Вызывается ровно один раз на экземпляр.
    fn create(
        &self,
        broker: BrokerHandle,
        config: &ModuleConfig,
    ) -> GatemeshResult<Box<dyn Module>>;

    /// Парная операция к `parse_configuration`.
    fn free_configuration(
        &self,
        config: ModuleConfig,
    ) {
        drop(config);
    }
}

/// Таблица API единицы кода: версия контракта и фабрика.
///
/// Разрешается один раз при создании модуля; дальнейшая доставка идёт
/// напрямую через `Box<dyn Module>`.
#[derive(Clone)]
pub struct ModuleApi {
    version: ApiVersion,
    factory: Arc<dyn ModuleFactory>,
}

impl ModuleApi {
    pub fn new(
        version: ApiVersion,
        factory: Arc<dyn ModuleFactory>,
    ) -> Self {
        Self { version, factory }
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn factory(&self) -> &Arc<dyn ModuleFactory> {
        &self.factory
    }
}

impl fmt::Debug for ModuleApi {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ModuleApi")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Фабрика из замыкания; удобна для статических таблиц и тестов.
pub struct FnModuleFactory<F> {
    create: F,
}

impl<F> FnModuleFactory<F>
where
    F: Fn(BrokerHandle, &ModuleConfig) -> GatemeshResult<Box<dyn Module>> + Send + Sync,
{
    pub fn new(create: F) -> Self {
        Self { create }
    }
}

impl<F> ModuleFactory for FnModuleFactory<F>
where
    F: Fn(BrokerHandle, &ModuleConfig) -> GatemeshResult<Box<dyn Module>> + Send + Sync,
{
    fn create(
        &self,
        broker: BrokerHandle,
        config: &ModuleConfig,
    ) -> GatemeshResult<Box<dyn Module>> {
        (self.create)(broker, config)
    }
}

/// Достаёт конфигурацию конкретного типа или возвращает ошибку разбора.
pub fn config_as<'a, T: Any>(
    config: &'a ModuleConfig,
    module: &str,
) -> GatemeshResult<&'a T> {
    config.downcast_ref::<T>().ok_or_else(|| {
        ConfigError::ParseFailed {
            module: module.to_string(),
            reason: format!(
                "configuration is not of type {}",
                std::any::type_name::<T>()
            ),
        }
        .into()
    })
}

/// Экспортирует точку входа модуля из крейта-плагина (`cdylib`).
///
/// ```ignore
/// gatemesh::export_module!(gatemesh::ApiVersion::V2, MyFactory::default());
/// ```
#[macro_export]
macro_rules! export_module {
    ($version:expr, $factory:expr) => {
        #[no_mangle]
        pub static GATEMESH_MODULE_ABI: &str = $crate::modules::ABI_TAG;

        #[no_mangle]
        pub fn gatemesh_module_api(host_version: u32) -> *mut $crate::modules::ModuleApi {
            let version: $crate::modules::ApiVersion = $version;
            if version.as_u32() > host_version {
                return ::std::ptr::null_mut();
            }
            let api = $crate::modules::ModuleApi::new(version, ::std::sync::Arc::new($factory));
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(api))
        }
    };
}
