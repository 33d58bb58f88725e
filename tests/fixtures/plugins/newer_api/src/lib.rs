//! Библиотека с верной ABI-меткой, которой нужна версия API новее, чем
//! умеет хост. Таблицу она не возвращает.

use gatemesh::{
    modules::{ModuleApi, ABI_TAG},
    ApiVersion,
};

#[no_mangle]
pub static GATEMESH_MODULE_ABI: &str = ABI_TAG;

/// Null для любого хоста, чья версия ниже `CURRENT + 1`. Других хостов
/// пока нет.
#[no_mangle]
pub fn gatemesh_module_api(host_version: u32) -> *mut ModuleApi {
    let required = ApiVersion::CURRENT.as_u32() + 1;
    if host_version >= required {
        unimplemented!("API v{required} has no table yet");
    }
    std::ptr::null_mut()
}
