//! Ties a decoded [`RegistryEvent`] to a [`Processor`] batch and produces the
//! [`Receipt`] the surrounding system persists (SPEC_FULL.md §4.2, §7).

use tokio_util::sync::CancellationToken;

use validator_core::{Receipt, RegistryEvent, RegistryPayload, TableId};
use validator_sql::{QueryType, ValidationError, Validator};

use crate::batch::Batch;
use crate::error::{ProcessorError, Result};
use crate::processor::Processor;

/// Validate and apply one on-chain event against `processor`, returning the
/// receipt the surrounding system persists. Never panics or propagates: any
/// failure becomes a failure [`Receipt`] carrying a human-readable error.
pub async fn process_event(
    processor: &Processor,
    validator: &Validator,
    event: &RegistryEvent,
    ctx: &CancellationToken,
) -> Receipt {
    match dispatch(processor, validator, event, ctx).await {
        Ok(table_id) => Receipt::success(event.chain_id, event.tx_hash.clone(), event.block_number, table_id),
        Err(e) => Receipt::failure(
            event.chain_id,
            event.tx_hash.clone(),
            event.block_number,
            e.to_string(),
            event.event_index,
        ),
    }
}

async fn dispatch(
    processor: &Processor,
    validator: &Validator,
    event: &RegistryEvent,
    ctx: &CancellationToken,
) -> Result<Option<TableId>> {
    let mut batch = processor.open_batch(ctx).await?;

    let outcome = dispatch_in_batch(&mut batch, validator, event).await;

    match outcome {
        Ok(table_id) => {
            batch.commit().await?;
            batch.close().await?;
            Ok(table_id)
        }
        Err(e) => {
            let _ = batch.close().await;
            Err(e)
        }
    }
}

async fn dispatch_in_batch(batch: &mut Batch, validator: &Validator, event: &RegistryEvent) -> Result<Option<TableId>> {
    match &event.payload {
        RegistryPayload::TableCreated { table_id, controller, description, statement } => {
            let create = validator.validate_create(statement)?;
            batch.insert_table(*table_id, *controller, description, &create).await?;
            Ok(Some(*table_id))
        }

        RegistryPayload::RunSql { caller, table_id, statement } => {
            let (kind, _read, writes) = validator.validate_run(statement)?;
            if kind != QueryType::Write {
                // On-chain events only ever carry mutation intents; a SELECT
                // slipping in here has nothing for the Processor to apply.
                return Err(ProcessorError::Validation(ValidationError::NoTopLevelUpdateInsertDelete));
            }
            batch.exec_write_queries(*caller, *table_id, writes).await?;
            Ok(Some(*table_id))
        }

        RegistryPayload::GrantPrivileges { caller, table_id, grantee, privileges } => {
            batch.grant_privileges(*caller, *table_id, *grantee, *privileges).await?;
            Ok(Some(*table_id))
        }

        RegistryPayload::RevokePrivileges { caller, table_id, grantee, privileges } => {
            batch.revoke_privileges(*caller, *table_id, *grantee, *privileges).await?;
            Ok(Some(*table_id))
        }
    }
}
