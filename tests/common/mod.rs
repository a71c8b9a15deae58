//! Shared chain fixtures for integration tests.

#![allow(dead_code)]

use shard_explorer::address::{Address, AddressCodec, Bech32Codec};
use shard_explorer::block::Block;
use shard_explorer::committee::{Committee, Validator, BLS_PUBLIC_KEY_LENGTH};
use shard_explorer::persistence::{
    write_address, write_block, write_committee, write_head_height, write_transaction,
    StorageWriter,
};
use shard_explorer::sharding::{EpochSchedule, NetworkInstance};
use shard_explorer::transaction::{AddressRecord, Transaction, TransactionView, RECEIVED, SENT};

pub const MEMBERS: u8 = 4;
/// Bitmap every block carries for its parent: members 0, 1 and 3 signed.
pub const SIGNED: u8 = 0b0000_1011;
pub const SENDER: Address = Address([0xaa; 20]);
pub const RECEIVER: Address = Address([0xbb; 20]);

/// Epoch 1 starts at height 8, every later epoch is 8 blocks long. Two shards
/// until epoch 2, four from then on.
pub fn schedule() -> EpochSchedule {
    EpochSchedule::new(
        8,
        8,
        vec![
            (0, NetworkInstance::new("v0", 2, 4).expect("instance")),
            (2, NetworkInstance::new("v1", 4, 4).expect("instance")),
        ],
    )
    .expect("schedule")
}

pub fn validator(epoch: u64, i: u8) -> Validator {
    let tag = (epoch as u8).wrapping_mul(MEMBERS).wrapping_add(i + 1);
    Validator {
        ecdsa_address: Address([tag; 20]),
        bls_public_key: vec![tag; BLS_PUBLIC_KEY_LENGTH],
    }
}

pub fn committee(epoch: u64) -> Committee {
    Committee {
        shard_id: 0,
        epoch,
        validators: (0..MEMBERS).map(|i| validator(epoch, i)).collect(),
    }
}

/// Bech32 addresses of the members enabled in [`SIGNED`].
pub fn expected_signers(epoch: u64) -> Vec<String> {
    let codec = Bech32Codec::default();
    (0..MEMBERS)
        .filter(|i| SIGNED & (1 << i) != 0)
        .map(|i| codec.encode(&validator(epoch, i).ecdsa_address).expect("encode"))
        .collect()
}

fn transfer(height: u64) -> Transaction {
    Transaction {
        nonce: height,
        shard_id: 0,
        to_shard_id: 0,
        from: SENDER,
        to: Some(RECEIVER),
        value: 1_000 + height as u128,
        gas_limit: 21_000,
        gas_price: 1,
        data: vec![],
    }
}

/// Writes blocks `0..=head` 5 seconds apart, one committee per epoch, one
/// indexed transfer per block and the sender's address history.
pub fn populate(store: &dyn StorageWriter, head: u64) -> Vec<Block> {
    let schedule = schedule();
    let codec = Bech32Codec::default();
    let mut blocks = Vec::new();
    let mut parent = [0u8; 32];
    let mut history = Vec::new();

    for height in 0..=head {
        let tx = transfer(height);
        let block = Block::new(
            height,
            schedule.calc_epoch_number(height),
            0,
            1_600_000_000 + height * 5,
            parent,
            vec![tx.clone()],
        )
        .with_last_commit_bitmap(vec![SIGNED]);
        parent = block.hash();
        write_block(store, &block).expect("write block");

        let mut view = TransactionView::new(&tx, block.time(), &codec).expect("view");
        write_transaction(store, &view).expect("write tx");
        view.kind = if height % 3 == 0 { RECEIVED } else { SENT }.to_string();
        history.push(view);
        blocks.push(block);
    }

    for epoch in 0..=schedule.calc_epoch_number(head) {
        write_committee(store, &committee(epoch)).expect("write committee");
    }
    write_head_height(store, head).expect("write head");
    write_address(
        store,
        &SENDER,
        &AddressRecord {
            id: SENDER.to_hex(),
            balance: "5000".to_string(),
            transactions: history,
        },
    )
    .expect("write address");

    blocks
}
