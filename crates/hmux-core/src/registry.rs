use std::collections::HashMap;
use std::sync::Arc;

use hmux_store::Client;
use hmux_types::{BackendId, OpContext};

use crate::error::{MuxError, MuxResult};

/// The fixed, ordered set of backends a mux routes to.
///
/// Every handle has exactly one [`BackendId`] (its address) and every id
/// indexes exactly one handle.
#[derive(Clone, Debug)]
pub struct BackendRegistry {
    clients: Vec<Arc<dyn Client>>,
    ids: Vec<BackendId>,
    by_id: HashMap<BackendId, usize>,
}

impl BackendRegistry {
    pub fn new(clients: Vec<Arc<dyn Client>>) -> MuxResult<Self> {
        if clients.is_empty() {
            return Err(MuxError::Config("at least one client is required".into()));
        }
        let mut ids = Vec::with_capacity(clients.len());
        let mut by_id = HashMap::with_capacity(clients.len());
        for (index, client) in clients.iter().enumerate() {
            let addr = client
                .addr()
                .ok_or_else(|| MuxError::Config(format!("client {index} has no address")))?;
            let id = BackendId::new(addr)?;
            if by_id.insert(id.clone(), index).is_some() {
                return Err(MuxError::Config(format!("duplicate backend address {id}")));
            }
            ids.push(id);
        }
        Ok(Self { clients, ids, by_id })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(&BackendId, &Arc<dyn Client>)> {
        Some((self.ids.get(index)?, self.clients.get(index)?))
    }

    /// Find the backend registered under `addr`.
    pub fn lookup(&self, addr: &str) -> Option<(&BackendId, &Arc<dyn Client>)> {
        self.by_id.get(addr).and_then(|&index| self.get(index))
    }

    pub fn ids(&self) -> &[BackendId] {
        &self.ids
    }

    pub fn clients(&self) -> &[Arc<dyn Client>] {
        &self.clients
    }

    /// Same backends, in the same order, with handles bound to `ctx`.
    pub fn bind(&self, ctx: &OpContext) -> Self {
        Self {
            clients: self.clients.iter().map(|c| c.with_context(ctx)).collect(),
            ids: self.ids.clone(),
            by_id: self.by_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmux_store::{ErrClient, InMemoryStore, StoreError};
    use std::time::Duration;

    fn stores(addrs: &[&str]) -> Vec<Arc<dyn Client>> {
        addrs
            .iter()
            .map(|a| Arc::new(InMemoryStore::new(*a)) as Arc<dyn Client>)
            .collect()
    }

    #[test]
    fn indexes_by_address_in_order() {
        let reg = BackendRegistry::new(stores(&["a:1", "b:2", "c:3"])).unwrap();
        assert_eq!(reg.len(), 3);
        assert!(!reg.is_empty());
        let ids: Vec<_> = reg.ids().iter().map(BackendId::as_str).collect();
        assert_eq!(ids, ["a:1", "b:2", "c:3"]);
        let (id, client) = reg.lookup("b:2").unwrap();
        assert_eq!(id.as_str(), "b:2");
        assert_eq!(client.addr(), Some("b:2"));
        assert!(reg.lookup("d:4").is_none());
        assert!(reg.get(3).is_none());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(BackendRegistry::new(Vec::new()), Err(MuxError::Config(_))));
    }

    #[test]
    fn rejects_duplicates() {
        let err = BackendRegistry::new(stores(&["a:1", "a:1"])).unwrap_err();
        assert!(err.to_string().contains("duplicate backend address a:1"));
    }

    #[test]
    fn rejects_client_without_address() {
        let clients: Vec<Arc<dyn Client>> = vec![
            Arc::new(InMemoryStore::new("a:1")),
            Arc::new(ErrClient::new(StoreError::Closed)),
        ];
        let err = BackendRegistry::new(clients).unwrap_err();
        assert!(err.to_string().contains("client 1 has no address"));
    }

    #[test]
    fn rejects_empty_address() {
        assert!(matches!(BackendRegistry::new(stores(&[""])), Err(MuxError::Backend(_))));
    }

    #[test]
    fn bind_keeps_index_and_shares_data() {
        let reg = BackendRegistry::new(stores(&["a:1", "b:2"])).unwrap();
        let bound = reg.bind(&OpContext::background().with_timeout(Duration::from_secs(5)));
        assert_eq!(bound.ids(), reg.ids());
        for (i, id) in reg.ids().iter().enumerate() {
            assert_eq!(bound.lookup(id.as_str()).map(|(_, c)| c.addr()), Some(Some(id.as_str())));
            assert_eq!(bound.get(i).map(|(id, _)| id), Some(id));
        }
        bound.clients()[0].set("k", "v", None).unwrap();
        assert_eq!(reg.clients()[0].get("k").unwrap().as_deref(), Some("v"));
        assert!(bound.clients()[0].context().deadline().is_some());
        assert!(reg.clients()[0].context().deadline().is_none());
    }
}
