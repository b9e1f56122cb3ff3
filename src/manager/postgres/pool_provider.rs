//! Read/write pool routing for [`PostgresStorage`](super::PostgresStorage).
//!
//! Listings, lookups and stats use [`PoolProvider::read`]. Inserts and the
//! `SELECT ... FOR UPDATE` transactions behind conditional writes use
//! [`PoolProvider::write`].

use sqlx::PgPool;

pub trait PoolProvider: Clone + Send + Sync + 'static {
    /// Pool for reads that tolerate replica lag.
    fn read(&self) -> &PgPool;

    /// Primary pool.
    fn write(&self) -> &PgPool;
}

impl PoolProvider for PgPool {
    fn read(&self) -> &PgPool {
        self
    }

    fn write(&self) -> &PgPool {
        self
    }
}

/// A primary for writes and a replica for reads, both supplied by the host.
#[derive(Clone, Debug)]
pub struct ReplicaPools {
    primary: PgPool,
    replica: PgPool,
}

impl ReplicaPools {
    pub fn new(primary: PgPool, replica: PgPool) -> Self {
        Self { primary, replica }
    }
}

impl PoolProvider for ReplicaPools {
    fn read(&self) -> &PgPool {
        &self.replica
    }

    fn write(&self) -> &PgPool {
        &self.primary
    }
}
