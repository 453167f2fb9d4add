//! Command definitions
//!
//! Requests a client can send to the server.

/// Command types (first byte of every request)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Put = 0x02,
    Delete = 0x03,
    Ping = 0x04,
    List = 0x05,
    Backup = 0x06,
    Stats = 0x07,
}

impl CommandType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(CommandType::Get),
            0x02 => Some(CommandType::Put),
            0x03 => Some(CommandType::Delete),
            0x04 => Some(CommandType::Ping),
            0x05 => Some(CommandType::List),
            0x06 => Some(CommandType::Backup),
            0x07 => Some(CommandType::Stats),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: Vec<u8> },

    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// Ping (health check)
    Ping,

    /// Every pair whose key starts with `prefix`
    List { prefix: Vec<u8> },

    /// Stream a consistent copy of the database file
    Backup,

    /// Store counters
    Stats,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Put { .. } => CommandType::Put,
            Command::Delete { .. } => CommandType::Delete,
            Command::Ping => CommandType::Ping,
            Command::List { .. } => CommandType::List,
            Command::Backup => CommandType::Backup,
            Command::Stats => CommandType::Stats,
        }
    }
}
