pub mod dlsite;
pub mod fanza;
pub mod vndb;

pub use dlsite::DlsiteProvider;
pub use fanza::FanzaProvider;
pub use vndb::VndbProvider;
