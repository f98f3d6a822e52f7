pub mod company;
pub mod partner;
pub mod qr;
pub mod tracking;
pub mod user;
