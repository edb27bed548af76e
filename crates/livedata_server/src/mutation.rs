//! Client-initiated writes.

use crate::connection::ConnectionId;
use async_trait::async_trait;
use livedata_codec::Value;
use livedata_core::{
    ensure_id, selector_document, CoreError, CoreResult, DataSource, MethodContext, Registry,
};
use livedata_protocol::{MutationOp, MutationRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a connection may apply a mutation.
#[async_trait]
pub trait MutationValidator: Send + Sync {
    /// Returns `Err(CoreError::Rejected { .. })` to refuse the request.
    async fn validate(&self, connection: ConnectionId, request: &MutationRequest) -> CoreResult<()>;
}

/// Validator that lets every request through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl MutationValidator for AcceptAll {
    async fn validate(&self, _connection: ConnectionId, _request: &MutationRequest) -> CoreResult<()> {
        Ok(())
    }
}

/// Result of applying one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// Value for the acknowledgement, or the error to report.
    pub result: CoreResult<Value>,
    /// Whether the data source may have been changed.
    pub touched: bool,
}

impl MutationOutcome {
    fn refused(err: CoreError) -> Self {
        Self {
            result: Err(err),
            touched: false,
        }
    }
}

/// Applies mutation requests against the data source.
#[derive(Clone)]
pub struct MutationHandler {
    registry: Arc<Registry>,
    data_source: Arc<dyn DataSource>,
    validator: Arc<dyn MutationValidator>,
}

impl MutationHandler {
    /// Creates a handler that accepts every request.
    pub fn new(registry: Arc<Registry>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            registry,
            data_source,
            validator: Arc::new(AcceptAll),
        }
    }

    /// Replaces the validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn MutationValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Applies one request on behalf of `connection`.
    pub async fn apply(&self, connection: ConnectionId, request: &MutationRequest) -> MutationOutcome {
        let collection = request.collection.as_str();
        let Some(def) = self.registry.collection(collection) else {
            debug!(connection = %connection, collection, "mutation on unknown collection");
            return MutationOutcome::refused(CoreError::UnknownCollection {
                name: collection.to_owned(),
            });
        };

        if let Err(err) = self.validator.validate(connection, request).await {
            debug!(connection = %connection, collection, error = %err, "mutation rejected");
            return MutationOutcome::refused(err);
        }

        let outcome = match &request.op {
            MutationOp::Insert { document } => {
                let result = self
                    .data_source
                    .insert(collection, ensure_id(document.clone()))
                    .await
                    .map(Value::Object);
                Self::crud_outcome(result)
            }
            MutationOp::Update {
                selector,
                modifier,
                options,
            } => {
                let result = match selector_document(selector) {
                    Ok(selector) => self
                        .data_source
                        .update(collection, &selector, modifier, *options)
                        .await
                        .map(Value::from),
                    Err(err) => Err(err),
                };
                Self::crud_outcome(result)
            }
            MutationOp::Remove { selector } => {
                let result = match selector_document(selector) {
                    Ok(selector) => self
                        .data_source
                        .remove(collection, &selector)
                        .await
                        .map(Value::from),
                    Err(err) => Err(err),
                };
                Self::crud_outcome(result)
            }
            MutationOp::Method { method, args } => {
                let Some(handler) = def.method(method) else {
                    return MutationOutcome::refused(CoreError::UnknownMethod {
                        collection: collection.to_owned(),
                        method: method.clone(),
                    });
                };
                let ctx = MethodContext::new(collection, Arc::clone(&self.data_source));
                // A method may have written before failing.
                MutationOutcome {
                    result: handler.invoke(ctx, args.clone()).await,
                    touched: true,
                }
            }
        };

        match &outcome.result {
            Ok(_) => debug!(
                connection = %connection,
                collection,
                op = request.op.kind(),
                "mutation applied"
            ),
            Err(err) => warn!(
                connection = %connection,
                collection,
                op = request.op.kind(),
                error = %err,
                "mutation failed"
            ),
        }
        outcome
    }

    fn crud_outcome(result: CoreResult<Value>) -> MutationOutcome {
        let touched = match &result {
            Ok(_) => true,
            Err(err) => err.reached_data_source(),
        };
        MutationOutcome { result, touched }
    }
}
