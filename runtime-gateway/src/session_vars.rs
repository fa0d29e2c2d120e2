use std::collections::HashMap;
use tokio::sync::Mutex;

/// Per-session dynamic-variable map. Writes are serialized through a mutex
/// even though multiple tool calls may run concurrently (§4.5 Concurrency).
#[derive(Default)]
pub struct SessionVariables {
    vars: Mutex<HashMap<String, String>>,
}

impl SessionVariables {
    pub fn new(initial: HashMap<String, String>) -> Self {
        Self {
            vars: Mutex::new(initial),
        }
    }

    pub async fn set_many(&self, updates: HashMap<String, String>) {
        let mut guard = self.vars.lock().await;
        guard.extend(updates);
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.vars.lock().await.clone()
    }
}
