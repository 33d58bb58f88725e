use std::{collections::HashSet, sync::Arc};

use gatemesh_error::{ConfigError, GatemeshResult, StatusCode};

use super::{GatewayProperties, Link};

/// Что разрешено в списке связей помимо обычных рёбер.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkPolicy {
    pub allow_self_links: bool,
    pub allow_duplicate_links: bool,
}

/// Проверяет имя модуля и его уникальность среди уже созданных.
pub(crate) fn check_module_name(
    name: &str,
    known: &HashSet<Arc<str>>,
) -> GatemeshResult<()> {
    gatemesh_error::ensure!(
        !name.is_empty(),
        StatusCode::InvalidArgs,
        "module name must not be empty"
    );
    if known.contains(name) {
        return Err(ConfigError::DuplicateModule {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Проверяет связи против множества имён модулей.
///
/// Висячая связь всегда ошибка; петля и повтор связи допускаются только
/// если это разрешено политикой.
pub(crate) fn validate_links(
    links: &[Link],
    modules: &HashSet<Arc<str>>,
    policy: LinkPolicy,
) -> GatemeshResult<()> {
    let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(links.len());
    for link in links {
        if !modules.contains(link.source.as_str()) || !modules.contains(link.sink.as_str()) {
            return Err(ConfigError::DanglingLink {
                source_module: link.source.clone(),
                sink_module: link.sink.clone(),
            }
            .into());
        }
        if link.source == link.sink && !policy.allow_self_links {
            return Err(ConfigError::SelfLink {
                name: link.source.clone(),
            }
            .into());
        }
        if !seen.insert((link.source.as_str(), link.sink.as_str())) && !policy.allow_duplicate_links
        {
            return Err(ConfigError::DuplicateLink {
                source_module: link.source.clone(),
                sink_module: link.sink.clone(),
            }
            .into());
        }
    }
    Ok(())
}

impl GatewayProperties {
    /// Проверяет описание без загрузки модулей: имена и связи.
    pub fn validate(
        &self,
        policy: LinkPolicy,
    ) -> GatemeshResult<()> {
        let mut names: HashSet<Arc<str>> = HashSet::with_capacity(self.modules.len());
        for entry in &self.modules {
            check_module_name(&entry.name, &names)?;
            names.insert(Arc::from(entry.name.as_str()));
        }
        validate_links(&self.links, &names, policy)
    }
}
