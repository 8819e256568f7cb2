mod admin;
mod auth;
mod files;
mod setup;
mod uploads;

pub use admin::{admin_purge, health};
pub use auth::{auth_status, hash_password, login, password_status, setup_password};
pub use files::{delete_file, download_file, list_files, short_link, storage_stats};
pub use setup::{save_config, setup_status, test_config};
pub use uploads::{
    cancel_upload, complete_multipart, confirm_upload, initiate_multipart, presign_part,
    presign_upload,
};
