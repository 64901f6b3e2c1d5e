//! Batch id reservation against the coordinator.
//!
//! One `IdAllocator` is owned exclusively by the current master session. It is primed when this
//! node becomes master and discarded when it stops being master; `next()` is only ever called
//! from the single task processing `register` calls on the master, so the batch bookkeeping here
//! needs no more than a `tokio::Mutex` around an in-memory counter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::RegistryError;
use crate::model::SchemaId;
use crate::ports::Coordinator;

/// How many ids a single coordinator reservation hands out at a time.
const DEFAULT_BATCH_SIZE: i32 = 20;

/// Backoff between retries when a conditional write to the counter node loses a race.
const RESERVATION_BACKOFF: Duration = Duration::from_millis(50);

struct Batch {
    /// The next id this allocator will issue.
    next: i32,
    /// The exclusive upper bound of the reserved range.
    end: i32,
}

pub struct IdAllocator<C: Coordinator> {
    coordinator: Arc<C>,
    counter_path: String,
    batch_size: i32,
    batch: Mutex<Option<Batch>>,
}

impl<C: Coordinator> IdAllocator<C> {
    pub fn new(coordinator: Arc<C>, counter_path: impl Into<String>) -> Self {
        Self::with_batch_size(coordinator, counter_path, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(
        coordinator: Arc<C>,
        counter_path: impl Into<String>,
        batch_size: i32,
    ) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        IdAllocator {
            coordinator,
            counter_path: counter_path.into(),
            batch_size,
            batch: Mutex::new(None),
        }
    }

    /// Reserves this session's first batch, reconciling against `max_id_in_store` (the highest id
    /// ever observed in the log). Called once, synchronously, as part of becoming master.
    #[tracing::instrument(skip(self))]
    pub async fn prime(&self, max_id_in_store: i32) -> Result<(), RegistryError> {
        let batch = self.reserve_batch(max_id_in_store).await?;
        tracing::info!(start = batch.next, end = batch.end, "primed schema id allocator");
        *self.batch.lock().await = Some(batch);
        Ok(())
    }

    /// Discards the in-memory batch. Called when this node stops being master; the coordinator's
    /// counter node is left untouched; whichever node becomes master next will reconcile against
    /// it the usual way.
    pub async fn reset(&self) {
        *self.batch.lock().await = None;
    }

    /// Returns the next globally unique id, reserving a fresh batch first if the current one is
    /// exhausted. `max_id_in_store` must reflect the store's current state so a reservation that
    /// happens here reconciles correctly against ids a previous master already issued.
    pub async fn next(&self, max_id_in_store: i32) -> Result<SchemaId, RegistryError> {
        let mut guard = self.batch.lock().await;
        let batch = guard.as_mut().ok_or_else(|| {
            RegistryError::store(anyhow::anyhow!(
                "id allocator used before being primed as master"
            ))
        })?;

        // `>=`, not `==`: a concurrent writer (there should never be one once this allocator is
        // the sole owner, but defending against it costs nothing) could otherwise step past the
        // exact boundary and never trigger a reservation.
        if batch.next >= batch.end {
            let fresh = self.reserve_batch(max_id_in_store).await?;
            *batch = fresh;
        }

        let id = batch.next;
        batch.next += 1;
        Ok(id)
    }

    async fn reserve_batch(&self, max_id_in_store: i32) -> Result<Batch, RegistryError> {
        loop {
            match self
                .coordinator
                .read_node(&self.counter_path)
                .await
                .map_err(RegistryError::store)?
            {
                None => {
                    let start = align(max_id_in_store + 1, self.batch_size);
                    let end = start + self.batch_size;
                    match self
                        .coordinator
                        .create_node(&self.counter_path, end.to_string().into_bytes())
                        .await
                    {
                        Ok(()) => return Ok(Batch { next: start, end }),
                        Err(err) => {
                            // Lost the race to create the node; someone else primed first. Loop
                            // back around and read what they wrote.
                            tracing::debug!(
                                %err,
                                "schema id counter appeared concurrently, retrying"
                            );
                            continue;
                        }
                    }
                }
                Some(node) => {
                    let text = String::from_utf8(node.value).map_err(|err| {
                        RegistryError::store(anyhow::anyhow!(
                            "schema id counter node is not valid UTF-8: {err}"
                        ))
                    })?;
                    let mut upper: i32 = text.trim().parse().map_err(|err| {
                        RegistryError::store(anyhow::anyhow!(
                            "schema id counter node {text:?} is not an integer: {err}"
                        ))
                    })?;

                    if upper % self.batch_size != 0 {
                        tracing::warn!(
                            upper,
                            batch_size = self.batch_size,
                            "schema id counter is not batch-aligned, rounding up"
                        );
                        upper = align(upper, self.batch_size);
                    }

                    let start = std::cmp::max(upper, align(max_id_in_store + 1, self.batch_size));
                    let end = start + self.batch_size;

                    let accepted = self
                        .coordinator
                        .compare_and_set(
                            &self.counter_path,
                            end.to_string().into_bytes(),
                            node.version,
                        )
                        .await
                        .map_err(RegistryError::store)?;

                    if accepted {
                        return Ok(Batch { next: start, end });
                    }

                    tokio::time::sleep(RESERVATION_BACKOFF).await;
                }
            }
        }
    }
}

/// Rounds `x` up to the next multiple of `batch_size`.
fn align(x: i32, batch_size: i32) -> i32 {
    ((x + batch_size - 1) / batch_size) * batch_size
}
