use shared::DEFAULT_PORT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address to connect to
    pub server: String,
    /// Name announced in the handshake
    pub name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            name: "Player".to_string(),
        }
    }
}
