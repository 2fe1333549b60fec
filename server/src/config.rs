//! Server settings, filled from the command line in `main`.

use shared::DEFAULT_PORT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on; 0 picks a free one
    pub port: u16,
    /// Seats in the game; the game starts once all are taken
    pub players: usize,
    pub map_width: i32,
    pub map_height: i32,
    /// Hide unexplored tiles from each team
    pub fog: bool,
    /// Fixed seed for map generation and battle draws
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            players: 2,
            map_width: 24,
            map_height: 16,
            fog: true,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
