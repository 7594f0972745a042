pub mod init;
pub mod layers;
pub mod module;

pub use layers::{Linear, Softmax};
pub use module::Module;
