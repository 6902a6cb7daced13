// Handler modules
pub mod profile;
pub mod status;

pub use profile::{ProfileOptions, handle_profile};
pub use status::handle_status;
