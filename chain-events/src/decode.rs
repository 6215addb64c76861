use crate::log::ChainLog;
use crate::signatures;
use model::{Address, Hash32};
use primitive_types::{H160, U256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic0,
    #[error("unrecognized event signature {0}")]
    UnknownSignature(Hash32),
    #[error("expected {expected} topics, got {actual}")]
    WrongTopicCount { expected: usize, actual: usize },
    #[error("data field too short: expected at least {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },
    #[error("dynamic array length/offset in data did not fit the payload")]
    MalformedDynamicArray,
}

/// An on-chain event this system reacts to, decoded from its raw topics and
/// data. Every variant corresponds to one of the triggers the ingestor maps
/// to a job in the work queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedEvent {
    OrderCancelled {
        order_hash: Hash32,
    },
    OrdersMatched {
        maker: Address,
        taker: Address,
        maker_order_hash: Hash32,
        taker_order_hash: Hash32,
        price: U256,
    },
    NonceIncremented {
        maker: Address,
        new_nonce: U256,
    },
    Erc721Transfer {
        contract: Address,
        from: Address,
        to: Address,
        token_id: U256,
    },
    Erc1155TransferSingle {
        contract: Address,
        operator: Address,
        from: Address,
        to: Address,
        token_id: U256,
        value: U256,
    },
    Erc1155TransferBatch {
        contract: Address,
        operator: Address,
        from: Address,
        to: Address,
        token_ids: Vec<U256>,
        values: Vec<U256>,
    },
    ApprovalForAll {
        contract: Address,
        owner: Address,
        operator: Address,
        approved: bool,
    },
    Erc20Transfer {
        contract: Address,
        from: Address,
        to: Address,
        value: U256,
    },
    Erc20Approval {
        contract: Address,
        owner: Address,
        spender: Address,
        value: U256,
    },
}

fn topic_address(topic: &Hash32) -> Address {
    Address(H160::from_slice(&topic.0.as_bytes()[12..]))
}

fn word(data: &[u8], index: usize) -> Result<[u8; 32], DecodeError> {
    let start = index * 32;
    let end = start + 32;
    data.get(start..end)
        .map(|slice| {
            let mut out = [0u8; 32];
            out.copy_from_slice(slice);
            out
        })
        .ok_or(DecodeError::DataTooShort {
            expected: end,
            actual: data.len(),
        })
}

fn word_u256(data: &[u8], index: usize) -> Result<U256, DecodeError> {
    Ok(U256::from_big_endian(&word(data, index)?))
}

fn dynamic_u256_array(data: &[u8], offset_word: usize) -> Result<Vec<U256>, DecodeError> {
    let offset = word_u256(data, offset_word)?.as_usize();
    if offset % 32 != 0 {
        return Err(DecodeError::MalformedDynamicArray);
    }
    let length_word = offset / 32;
    let length = word_u256(data, length_word)?.as_usize();
    (0..length)
        .map(|i| word_u256(data, length_word + 1 + i))
        .collect()
}

/// Decodes a single log into a [`DecodedEvent`], or an error if its
/// signature is unknown or its payload is malformed. Unknown signatures are
/// expected and routine (every contract on chain emits logs); callers treat
/// them as "not interesting to us", not as a failure worth propagating.
pub fn decode_log(log: &ChainLog) -> Result<DecodedEvent, DecodeError> {
    let topic0 = *log.topics.first().ok_or(DecodeError::MissingTopic0)?;

    if topic0 == *signatures::ORDER_CANCELLED {
        expect_topics(log, 2)?;
        return Ok(DecodedEvent::OrderCancelled {
            order_hash: log.topics[1],
        });
    }
    if topic0 == *signatures::ORDERS_MATCHED {
        expect_topics(log, 3)?;
        return Ok(DecodedEvent::OrdersMatched {
            maker: topic_address(&log.topics[1]),
            taker: topic_address(&log.topics[2]),
            maker_order_hash: Hash32::from_bytes(word(&log.data, 0)?),
            taker_order_hash: Hash32::from_bytes(word(&log.data, 1)?),
            price: word_u256(&log.data, 2)?,
        });
    }
    if topic0 == *signatures::NONCE_INCREMENTED {
        expect_topics(log, 2)?;
        return Ok(DecodedEvent::NonceIncremented {
            maker: topic_address(&log.topics[1]),
            new_nonce: word_u256(&log.data, 0)?,
        });
    }
    if topic0 == *signatures::APPROVAL_FOR_ALL {
        expect_topics(log, 3)?;
        return Ok(DecodedEvent::ApprovalForAll {
            contract: log.address,
            owner: topic_address(&log.topics[1]),
            operator: topic_address(&log.topics[2]),
            approved: word_u256(&log.data, 0)? != U256::zero(),
        });
    }
    if topic0 == *signatures::ERC1155_TRANSFER_SINGLE {
        expect_topics(log, 4)?;
        return Ok(DecodedEvent::Erc1155TransferSingle {
            contract: log.address,
            operator: topic_address(&log.topics[1]),
            from: topic_address(&log.topics[2]),
            to: topic_address(&log.topics[3]),
            token_id: word_u256(&log.data, 0)?,
            value: word_u256(&log.data, 1)?,
        });
    }
    if topic0 == *signatures::ERC1155_TRANSFER_BATCH {
        expect_topics(log, 4)?;
        return Ok(DecodedEvent::Erc1155TransferBatch {
            contract: log.address,
            operator: topic_address(&log.topics[1]),
            from: topic_address(&log.topics[2]),
            to: topic_address(&log.topics[3]),
            token_ids: dynamic_u256_array(&log.data, 0)?,
            values: dynamic_u256_array(&log.data, 1)?,
        });
    }
    if topic0 == *signatures::ERC721_TRANSFER && log.topics.len() == 4 {
        return Ok(DecodedEvent::Erc721Transfer {
            contract: log.address,
            from: topic_address(&log.topics[1]),
            to: topic_address(&log.topics[2]),
            token_id: U256::from_big_endian(log.topics[3].as_bytes()),
        });
    }
    if topic0 == *signatures::ERC20_TRANSFER && log.topics.len() == 3 {
        return Ok(DecodedEvent::Erc20Transfer {
            contract: log.address,
            from: topic_address(&log.topics[1]),
            to: topic_address(&log.topics[2]),
            value: word_u256(&log.data, 0)?,
        });
    }
    if topic0 == *signatures::ERC20_APPROVAL && log.topics.len() == 3 {
        return Ok(DecodedEvent::Erc20Approval {
            contract: log.address,
            owner: topic_address(&log.topics[1]),
            spender: topic_address(&log.topics[2]),
            value: word_u256(&log.data, 0)?,
        });
    }

    Err(DecodeError::UnknownSignature(topic0))
}

fn expect_topics(log: &ChainLog, expected: usize) -> Result<(), DecodeError> {
    if log.topics.len() != expected {
        return Err(DecodeError::WrongTopicCount {
            expected,
            actual: log.topics.len(),
        });
    }
    Ok(())
}
