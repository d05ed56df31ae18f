pub mod redirect;
pub mod reputation;
pub mod short_code;
pub mod url_service;
