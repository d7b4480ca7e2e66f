use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Collection, MemoryCollection};
use crate::{Error, Result};

/// In-memory collection whose writes start failing after a set number of puts
#[derive(Debug)]
pub struct FlakyCollection {
    inner: MemoryCollection,
    puts_left: AtomicUsize,
}

impl FlakyCollection {
    pub fn failing_after(puts: usize) -> Self {
        Self {
            inner: MemoryCollection::new(),
            puts_left: AtomicUsize::new(puts),
        }
    }

    pub fn set_puts_left(&self, puts: usize) {
        self.puts_left.store(puts, Ordering::SeqCst);
    }
}

#[async_trait]
impl Collection for FlakyCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.puts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| Error::Storage("disk full".to_string()))?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}
