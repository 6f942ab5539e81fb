mod connection;
mod decoder;
mod encoder;
mod options;

pub mod commands;

pub use commands::{EngineMessage, GoParams, GuiCommand, Info, Score};
pub use connection::EngineConnection;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use options::{UciOption, UciOptionType};
