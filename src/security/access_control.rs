//! Client authorization.
//! Maps an authenticated client identifier to the upstreams it may reach.

use std::collections::HashMap;

use crate::config::ClientConfig;

/// Client identifier → ordered allow-list.
#[derive(Debug, Clone, Default)]
pub struct AuthScheme {
    allowed: HashMap<String, Vec<String>>,
}

impl AuthScheme {
    pub fn from_config(clients: &[ClientConfig]) -> Self {
        let allowed = clients
            .iter()
            .map(|c| (c.id.clone(), c.upstreams.clone()))
            .collect();
        Self { allowed }
    }

    /// The client's allow-list, or None if the client is unknown.
    pub fn allowed_upstreams(&self, client_id: &str) -> Option<&[String]> {
        self.allowed.get(client_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_preserves_order() {
        let scheme = AuthScheme::from_config(&[
            ClientConfig {
                id: "client1.lb.com".into(),
                upstreams: vec!["localhost:9802".into(), "localhost:9801".into()],
            },
            ClientConfig {
                id: "client2.lb.com".into(),
                upstreams: vec!["localhost:9802".into()],
            },
        ]);

        assert_eq!(
            scheme.allowed_upstreams("client1.lb.com").unwrap(),
            ["localhost:9802", "localhost:9801"]
        );
        assert_eq!(scheme.allowed_upstreams("client2.lb.com").unwrap(), ["localhost:9802"]);
        assert!(scheme.allowed_upstreams("client3.lb.com").is_none());
        assert_eq!(scheme.len(), 2);
    }
}
