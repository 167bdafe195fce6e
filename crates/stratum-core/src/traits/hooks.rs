//! Pre-operation hooks
//!
//! A repository calls an injected capability object before each staged
//! mutation instead of relying on subclass overrides. Hooks receive the
//! entity as `&dyn Any` and downcast to the types they care about; the
//! defaults are no-ops.

use crate::error::Result;
use async_trait::async_trait;
use std::any::Any;

#[async_trait]
pub trait Hooks: Send + Sync {
    async fn before_add(&self, _entity: &(dyn Any + Send + Sync)) -> Result<()> {
        Ok(())
    }

    async fn before_remove(&self, _entity: &(dyn Any + Send + Sync)) -> Result<()> {
        Ok(())
    }

    async fn before_update(&self, _entity: &(dyn Any + Send + Sync)) -> Result<()> {
        Ok(())
    }
}

/// The default hook object: every hook is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

#[async_trait]
impl Hooks for NoHooks {}
