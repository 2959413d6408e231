use scanbox_common::network::host::DiscoveryItem;
use tokio::sync::RwLock;

/// The one piece of state every branch writes to.
///
/// Writers hand over complete batches, so a reader sees each batch either
/// entirely or not at all.
#[derive(Debug, Default)]
pub struct ResultCollection {
    items: RwLock<Vec<DiscoveryItem>>,
}

impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch under a single write lock.
    pub async fn extend(&self, batch: Vec<DiscoveryItem>) {
        if batch.is_empty() {
            return;
        }
        self.items.write().await.extend(batch);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> Vec<DiscoveryItem> {
        self.items.read().await.clone()
    }

    pub fn into_inner(self) -> Vec<DiscoveryItem> {
        self.items.into_inner()
    }
}
