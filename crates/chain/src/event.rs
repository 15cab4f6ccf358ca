//! Decoding of registry-contract logs into [`validator_core::RegistryEvent`]
//! (SPEC_FULL.md §6.1).
//!
//! The registry contract emits one topic-0 selector per intent; every field
//! is ABI-encoded in the log's `data` (none of the arguments are indexed), so
//! decoding is a single `ethers::abi::decode` call per event kind.

use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Log, H256};
use ethers::utils::keccak256;

use validator_common::{Error, Result};
use validator_core::{Address, ChainId, PrivilegeSet, RegistryEvent, RegistryPayload, TableId};

fn selector(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

fn table_created_topic() -> H256 {
    selector("TableCreated(uint256,address,string,string)")
}

fn run_sql_topic() -> H256 {
    selector("RunSQL(address,uint256,string)")
}

fn privileges_granted_topic() -> H256 {
    selector("PrivilegesGranted(address,uint256,address,uint8)")
}

fn privileges_revoked_topic() -> H256 {
    selector("PrivilegesRevoked(address,uint256,address,uint8)")
}

fn as_address(token: &Token) -> Option<Address> {
    token.clone().into_address().map(|a| Address(a.0))
}

fn as_table_id(token: &Token) -> Option<TableId> {
    token.clone().into_uint().map(|u| TableId(u.as_u64()))
}

fn as_string(token: &Token) -> Option<String> {
    token.clone().into_string()
}

fn as_privilege_set(token: &Token) -> Option<PrivilegeSet> {
    token.clone().into_uint().map(|u| PrivilegeSet(u.as_u32() as u8))
}

/// Decode one log into a `RegistryEvent`. Returns `Ok(None)` for a log whose
/// topic-0 doesn't match any registry intent — the registry-address filter
/// in `subscription.rs` should make that rare, but a future contract upgrade
/// adding events is not a decode error.
pub fn decode_log(chain_id: ChainId, log: &Log) -> Result<Option<RegistryEvent>> {
    let Some(topic0) = log.topics.first().copied() else {
        return Ok(None);
    };

    let block_number = log
        .block_number
        .map(|n| n.as_u64())
        .ok_or_else(|| Error::chain(chain_id.to_string(), "log is missing a block number"))?;
    let tx_hash = log
        .transaction_hash
        .map(|h| format!("{h:#x}"))
        .ok_or_else(|| Error::chain(chain_id.to_string(), "log is missing a transaction hash"))?;
    let event_index = log.log_index.map(|n| n.as_u64() as u32).unwrap_or_default();

    let payload = if topic0 == table_created_topic() {
        let tokens = decode(
            &[ParamType::Uint(256), ParamType::Address, ParamType::String, ParamType::String],
            &log.data,
        )
        .map_err(|e| Error::chain(chain_id.to_string(), format!("failed to decode TableCreated log: {e}")))?;
        RegistryPayload::TableCreated {
            table_id: as_table_id(&tokens[0]).ok_or_else(|| malformed(chain_id, "TableCreated.table_id"))?,
            controller: as_address(&tokens[1]).ok_or_else(|| malformed(chain_id, "TableCreated.controller"))?,
            description: as_string(&tokens[2]).ok_or_else(|| malformed(chain_id, "TableCreated.description"))?,
            statement: as_string(&tokens[3]).ok_or_else(|| malformed(chain_id, "TableCreated.statement"))?,
        }
    } else if topic0 == run_sql_topic() {
        let tokens = decode(&[ParamType::Address, ParamType::Uint(256), ParamType::String], &log.data)
            .map_err(|e| Error::chain(chain_id.to_string(), format!("failed to decode RunSQL log: {e}")))?;
        RegistryPayload::RunSql {
            caller: as_address(&tokens[0]).ok_or_else(|| malformed(chain_id, "RunSQL.caller"))?,
            table_id: as_table_id(&tokens[1]).ok_or_else(|| malformed(chain_id, "RunSQL.table_id"))?,
            statement: as_string(&tokens[2]).ok_or_else(|| malformed(chain_id, "RunSQL.statement"))?,
        }
    } else if topic0 == privileges_granted_topic() {
        let tokens = decode(
            &[ParamType::Address, ParamType::Uint(256), ParamType::Address, ParamType::Uint(8)],
            &log.data,
        )
        .map_err(|e| Error::chain(chain_id.to_string(), format!("failed to decode PrivilegesGranted log: {e}")))?;
        RegistryPayload::GrantPrivileges {
            caller: as_address(&tokens[0]).ok_or_else(|| malformed(chain_id, "PrivilegesGranted.caller"))?,
            table_id: as_table_id(&tokens[1]).ok_or_else(|| malformed(chain_id, "PrivilegesGranted.table_id"))?,
            grantee: as_address(&tokens[2]).ok_or_else(|| malformed(chain_id, "PrivilegesGranted.grantee"))?,
            privileges: as_privilege_set(&tokens[3]).ok_or_else(|| malformed(chain_id, "PrivilegesGranted.privileges"))?,
        }
    } else if topic0 == privileges_revoked_topic() {
        let tokens = decode(
            &[ParamType::Address, ParamType::Uint(256), ParamType::Address, ParamType::Uint(8)],
            &log.data,
        )
        .map_err(|e| Error::chain(chain_id.to_string(), format!("failed to decode PrivilegesRevoked log: {e}")))?;
        RegistryPayload::RevokePrivileges {
            caller: as_address(&tokens[0]).ok_or_else(|| malformed(chain_id, "PrivilegesRevoked.caller"))?,
            table_id: as_table_id(&tokens[1]).ok_or_else(|| malformed(chain_id, "PrivilegesRevoked.table_id"))?,
            grantee: as_address(&tokens[2]).ok_or_else(|| malformed(chain_id, "PrivilegesRevoked.grantee"))?,
            privileges: as_privilege_set(&tokens[3]).ok_or_else(|| malformed(chain_id, "PrivilegesRevoked.privileges"))?,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(RegistryEvent {
        chain_id,
        block_number,
        tx_hash,
        event_index,
        payload,
    }))
}

fn malformed(chain_id: ChainId, field: &str) -> Error {
    Error::chain(chain_id.to_string(), format!("malformed {field} in registry log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;
    use ethers::types::{Bytes, H160, U256, U64};

    fn base_log(topic: H256, data: Vec<u8>) -> Log {
        Log {
            address: H160::zero(),
            topics: vec![topic],
            data: Bytes::from(data),
            block_number: Some(U64::from(100)),
            transaction_hash: Some(H256::repeat_byte(7)),
            log_index: Some(U256::from(3)),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_table_created() {
        let data = encode(&[
            Token::Uint(U256::from(42)),
            Token::Address(H160::repeat_byte(1)),
            Token::String("a users table".into()),
            Token::String("CREATE TABLE users (id int4, name text)".into()),
        ]);
        let log = base_log(table_created_topic(), data);
        let event = decode_log(ChainId(1), &log).unwrap().expect("should decode");
        assert_eq!(event.block_number, 100);
        assert_eq!(event.event_index, 3);
        match event.payload {
            RegistryPayload::TableCreated { table_id, controller, description, statement } => {
                assert_eq!(table_id, TableId(42));
                assert_eq!(controller, Address([1u8; 20]));
                assert_eq!(description, "a users table");
                assert!(statement.starts_with("CREATE TABLE"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_run_sql() {
        let data = encode(&[
            Token::Address(H160::repeat_byte(2)),
            Token::Uint(U256::from(7)),
            Token::String("INSERT INTO users (id) VALUES (1)".into()),
        ]);
        let log = base_log(run_sql_topic(), data);
        let event = decode_log(ChainId(1), &log).unwrap().expect("should decode");
        match event.payload {
            RegistryPayload::RunSql { caller, table_id, .. } => {
                assert_eq!(caller, Address([2u8; 20]));
                assert_eq!(table_id, TableId(7));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_privileges_granted_bitmask() {
        let data = encode(&[
            Token::Address(H160::repeat_byte(3)),
            Token::Uint(U256::from(1)),
            Token::Address(H160::repeat_byte(4)),
            Token::Uint(U256::from(0b011u8)),
        ]);
        let log = base_log(privileges_granted_topic(), data);
        let event = decode_log(ChainId(1), &log).unwrap().expect("should decode");
        match event.payload {
            RegistryPayload::GrantPrivileges { privileges, .. } => {
                assert!(privileges.contains(validator_core::Privilege::Insert));
                assert!(privileges.contains(validator_core::Privilege::Update));
                assert!(!privileges.contains(validator_core::Privilege::Delete));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_topic_is_not_an_error() {
        let log = base_log(H256::repeat_byte(0xff), Vec::new());
        assert!(decode_log(ChainId(1), &log).unwrap().is_none());
    }
}
