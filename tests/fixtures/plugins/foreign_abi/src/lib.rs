//! Библиотека, собранная против несовместимой версии хоста: ABI-метка не
//! совпадает, точка входа не должна вызываться.

#[no_mangle]
pub static GATEMESH_MODULE_ABI: &str = "gatemesh-0.0.0-foreign";

#[no_mangle]
pub fn gatemesh_module_api(_host_version: u32) -> *mut u8 {
    std::ptr::null_mut()
}
