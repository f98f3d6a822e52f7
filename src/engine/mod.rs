pub mod lifecycle;
pub mod notifier;
pub mod qr_id;
pub mod view;
