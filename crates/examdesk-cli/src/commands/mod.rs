pub mod download;
pub mod init;
pub mod status;
pub mod take;
pub mod verify;
pub mod whoami;
