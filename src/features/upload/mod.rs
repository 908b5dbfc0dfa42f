pub mod handler;

pub use handler::create_upload_router;
