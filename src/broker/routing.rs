use std::{collections::HashMap, fmt, sync::Arc};

use gatemesh_error::{ConfigError, GatemeshResult};

use crate::{modules::ModuleSlot, Link};

/// Неизменяемый индекс маршрутизации: источник -> приёмники в порядке
/// списка связей.
///
/// Строится один раз при запуске брокера; рабочие потоки читают его без
/// блокировки.
#[derive(Default)]
pub struct RoutingIndex {
    routes: HashMap<Arc<str>, Vec<Arc<ModuleSlot>>>,
}

impl RoutingIndex {
    /// Пустой индекс: все сообщения отбрасываются как не имеющие приёмников.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn build<'a>(
        links: impl IntoIterator<Item = &'a Link>,
        slots: &HashMap<Arc<str>, Arc<ModuleSlot>>,
    ) -> GatemeshResult<Self> {
        let mut routes: HashMap<Arc<str>, Vec<Arc<ModuleSlot>>> = HashMap::new();
        for link in links {
            let dangling = || ConfigError::DanglingLink {
                source_module: link.source.clone(),
                sink_module: link.sink.clone(),
            };
            let (source, _) = slots
                .get_key_value(link.source.as_str())
                .ok_or_else(dangling)?;
            let sink = slots.get(link.sink.as_str()).ok_or_else(dangling)?;
            routes
                .entry(Arc::clone(source))
                .or_default()
                .push(Arc::clone(sink));
        }
        Ok(Self { routes })
    }

    pub(crate) fn sinks(
        &self,
        source: &str,
    ) -> &[Arc<ModuleSlot>] {
        self.routes.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Имена приёмников источника в порядке доставки.
    pub fn sink_names(
        &self,
        source: &str,
    ) -> Vec<&str> {
        self.sinks(source)
            .iter()
            .map(|slot| slot.name().as_ref())
            .collect()
    }

    /// Число источников, у которых есть хотя бы одна связь.
    pub fn source_count(&self) -> usize {
        self.routes.len()
    }

    pub fn link_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }
}

impl fmt::Debug for RoutingIndex {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut map = f.debug_map();
        for (source, sinks) in &self.routes {
            let names: Vec<&str> = sinks.iter().map(|s| s.name().as_ref()).collect();
            map.entry(source, &names);
        }
        map.finish()
    }
}
