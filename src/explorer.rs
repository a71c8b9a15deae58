//! Explorer query service.
//!
//! Validates raw request parameters and answers them from storage. Nothing in
//! here knows about HTTP; the `api` module maps results to responses.

use crate::address::{AddressCodec, Bech32Codec};
use crate::block::Block;
use crate::committee::{resolve_committee, CommitteeSource};
use crate::config::Config;
use crate::error::{ExplorerError, Result};
use crate::paginate::{paginate, DEFAULT_PAGE_SIZE};
use crate::persistence::{
    read_address, read_block, read_head_height, read_transaction, Storage,
};
use crate::scanner::{BlockWindowScanner, ExplorerBlock};
use crate::sharding::{gen_sharding_structure, EpochSchedule, ShardEndpoint};
use crate::transaction::{AddressRecord, TransactionView, RECEIVED, SENT};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_WINDOW: u64 = 10_000;

pub const TX_VIEW_NONE: &str = "NONE";
pub const TX_VIEW_ALL: &str = "ALL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlocksQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub page: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressQuery {
    pub id: Option<String>,
    pub tx_view: Option<String>,
    pub page: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitteeQuery {
    pub shard_id: Option<String>,
    pub epoch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorView {
    pub address: String,
    pub balance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitteeView {
    #[serde(rename = "shardID")]
    pub shard_id: u32,
    pub epoch: u64,
    pub validators: Vec<ValidatorView>,
}

/// Which address transactions to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxView {
    None,
    All,
    Received,
    Sent,
}

impl TxView {
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            TX_VIEW_NONE => Ok(TxView::None),
            TX_VIEW_ALL => Ok(TxView::All),
            RECEIVED => Ok(TxView::Received),
            SENT => Ok(TxView::Sent),
            other => Err(ExplorerError::Boundary(format!(
                "unknown tx_view {}",
                other
            ))),
        }
    }

    fn keeps(&self, tx: &TransactionView) -> bool {
        match self {
            TxView::None => false,
            TxView::All => true,
            TxView::Received => tx.kind == RECEIVED,
            TxView::Sent => tx.kind == SENT,
        }
    }
}

pub struct Explorer {
    store: Arc<dyn Storage>,
    schedule: EpochSchedule,
    shard_id: u32,
    codec: Arc<dyn AddressCodec>,
    http_template: String,
    ws_template: String,
    page_size: usize,
    max_window: u64,
}

impl Explorer {
    pub fn new(store: Arc<dyn Storage>, schedule: EpochSchedule, shard_id: u32) -> Self {
        Explorer {
            store,
            schedule,
            shard_id,
            codec: Arc::new(Bech32Codec::default()),
            http_template: String::new(),
            ws_template: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_window: DEFAULT_MAX_WINDOW,
        }
    }

    pub fn from_config(store: Arc<dyn Storage>, config: &Config) -> Result<Self> {
        let codec = Bech32Codec::new(&config.network.address_hrp)?;
        Ok(Self::new(store, config.schedule()?, config.network.shard_id)
            .with_codec(Arc::new(codec))
            .with_endpoints(
                &config.network.http_endpoint_template,
                &config.network.ws_endpoint_template,
            )
            .with_limits(config.explorer.default_page_size, config.explorer.max_window))
    }

    pub fn with_codec(mut self, codec: Arc<dyn AddressCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_endpoints(mut self, http_template: &str, ws_template: &str) -> Self {
        self.http_template = http_template.to_string();
        self.ws_template = ws_template.to_string();
        self
    }

    pub fn with_limits(mut self, page_size: usize, max_window: u64) -> Self {
        self.page_size = page_size.max(1);
        self.max_window = max_window.max(1);
        self
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn schedule(&self) -> &EpochSchedule {
        &self.schedule
    }

    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    /// Enriched blocks for `[from, to]`, paginated. `to` defaults to the
    /// chain head; an empty chain yields no blocks.
    pub fn blocks(&self, query: &BlocksQuery, cancelled: &AtomicBool) -> Result<Vec<ExplorerBlock>> {
        let from: u64 = parse_number(required(&query.from, "from")?, "from")?;
        let offset = parse_offset(&query.offset, self.page_size)?;
        let page: usize = optional_number(&query.page, "page")?.unwrap_or(0);

        let to = match optional_number::<u64>(&query.to, "to")? {
            Some(to) => to,
            None => match read_head_height(self.store()) {
                Ok(head) if head >= from => head,
                Ok(_) => return Ok(Vec::new()),
                Err(ExplorerError::NotFound(_)) => {
                    debug!("no chain head recorded yet");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            },
        };
        check_window(from, to, self.max_window)?;

        let scanner = BlockWindowScanner::new(self.store(), self.shard_id, self.codec.as_ref());
        let blocks = scanner.scan_until(from, to, cancelled)?;
        Ok(paginate(blocks, page, offset))
    }

    pub fn transaction(&self, query: &TransactionQuery) -> Result<TransactionView> {
        let id = required(&query.id, "id")?;
        read_transaction(self.store(), id).map_err(|e| {
            warn!(id, error = %e, "cannot read transaction");
            e
        })
    }

    /// Account record with its transactions filtered by `tx_view` and
    /// paginated. An unknown account yields an empty record for the id.
    pub fn address(&self, query: &AddressQuery) -> Result<AddressRecord> {
        let id = required(&query.id, "id")?;
        let view = match query.tx_view.as_deref() {
            Some(text) if !text.is_empty() => TxView::parse(text)?,
            _ => TxView::None,
        };
        let offset = parse_offset(&query.offset, self.page_size)?;
        let page: usize = optional_number(&query.page, "page")?.unwrap_or(0);
        let address = self
            .codec
            .decode(id)
            .map_err(|e| ExplorerError::Boundary(format!("invalid address id: {}", e)))?;

        info!(address = id, "querying address");
        let mut record = match read_address(self.store(), &address) {
            Ok(record) => record,
            Err(ExplorerError::NotFound(_)) => {
                debug!(address = id, "address not indexed");
                AddressRecord::default()
            }
            Err(e) => return Err(e),
        };

        record.id = id.to_string();
        let kept: Vec<TransactionView> = record
            .transactions
            .into_iter()
            .filter(|tx| view.keeps(tx))
            .collect();
        record.transactions = paginate(kept, page, offset);
        Ok(record)
    }

    /// Committee of this shard for the requested epoch. Epoch 0 means the
    /// epoch of the chain head block.
    pub fn committee(&self, query: &CommitteeQuery) -> Result<CommitteeView> {
        let shard_id: u32 = optional_number(&query.shard_id, "shard_id")?.unwrap_or(0);
        let mut epoch: u64 = optional_number(&query.epoch, "epoch")?.unwrap_or(0);
        if shard_id != self.shard_id {
            return Err(ExplorerError::Boundary(format!(
                "shard {} is not served here, this explorer serves shard {}",
                shard_id, self.shard_id
            )));
        }
        if epoch == 0 {
            epoch = self.current_epoch()?;
        }

        let mut fallbacks = Vec::with_capacity(2);
        if let Some(block) = self.optional_block(self.schedule.epoch_first_block(epoch)) {
            fallbacks.push(block);
        }
        if epoch > 0 {
            if let Some(block) = self.optional_block(self.schedule.epoch_last_block(epoch - 1)) {
                fallbacks.push(block);
            }
        }
        let (committee, source) = resolve_committee(
            self.store(),
            shard_id,
            epoch,
            fallbacks.iter().map(|b| &b.header),
        );
        if source == CommitteeSource::Empty {
            warn!(shard_id, epoch, "no committee found for epoch");
        }

        let validators = committee
            .validators
            .iter()
            .filter_map(|v| {
                let address = match self.codec.encode(&v.ecdsa_address) {
                    Ok(address) => address,
                    Err(e) => {
                        debug!(error = %e, "skipping validator with unencodable address");
                        return None;
                    }
                };
                let balance = match read_address(self.store(), &v.ecdsa_address) {
                    Ok(record) => record.balance,
                    Err(ExplorerError::NotFound(_)) => "0".to_string(),
                    Err(e) => {
                        warn!(address = %address, error = %e, "skipping validator without balance");
                        return None;
                    }
                };
                Some(ValidatorView { address, balance })
            })
            .collect();

        Ok(CommitteeView {
            shard_id,
            epoch,
            validators,
        })
    }

    /// Endpoint layout for the topology of the current epoch.
    pub fn sharding_structure(&self) -> Result<Vec<ShardEndpoint>> {
        let epoch = self.current_epoch()?;
        let instance = self.schedule.instance_for_epoch(epoch)?;
        Ok(gen_sharding_structure(
            instance.num_shards,
            self.shard_id,
            &self.http_template,
            &self.ws_template,
        ))
    }

    /// Epoch of the chain head block. Falls back to the schedule when the
    /// head block is unreadable, and to epoch 0 on an empty chain.
    pub fn current_epoch(&self) -> Result<u64> {
        let head = match read_head_height(self.store()) {
            Ok(head) => head,
            Err(ExplorerError::NotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        match read_block(self.store(), head) {
            Ok(block) => Ok(block.epoch()),
            Err(e) => {
                warn!(head, error = %e, "cannot read head block, deriving epoch from height");
                Ok(self.schedule.calc_epoch_number(head))
            }
        }
    }

    fn optional_block(&self, height: u64) -> Option<Block> {
        match read_block(self.store(), height) {
            Ok(block) => Some(block),
            Err(ExplorerError::NotFound(_)) => None,
            Err(e) => {
                warn!(height, error = %e, "cannot read fallback block");
                None
            }
        }
    }
}

/// Rejects `[from, to]` windows that are inverted, longer than
/// `max_window`, or end at the last representable height (no block can
/// follow it).
pub fn check_window(from: u64, to: u64, max_window: u64) -> Result<()> {
    if to < from {
        return Err(ExplorerError::Boundary(format!(
            "to ({}) is below from ({})",
            to, from
        )));
    }
    if to == u64::MAX {
        return Err(ExplorerError::Boundary(format!(
            "to ({}) leaves no room for a following block",
            to
        )));
    }
    if to - from >= max_window {
        return Err(ExplorerError::Boundary(format!(
            "window of {} blocks exceeds the limit of {}",
            to - from + 1,
            max_window
        )));
    }
    Ok(())
}

fn required<'q>(value: &'q Option<String>, name: &str) -> Result<&'q str> {
    match value.as_deref() {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ExplorerError::Boundary(format!("missing {} parameter", name))),
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, name: &str) -> Result<T> {
    text.parse::<T>()
        .map_err(|_| ExplorerError::Boundary(format!("invalid {} parameter: {}", name, text)))
}

fn optional_number<T: std::str::FromStr>(value: &Option<String>, name: &str) -> Result<Option<T>> {
    match value.as_deref() {
        Some(text) if !text.is_empty() => parse_number(text, name).map(Some),
        _ => Ok(None),
    }
}

fn parse_offset(value: &Option<String>, default: usize) -> Result<usize> {
    match optional_number::<usize>(value, "offset")? {
        Some(0) => Err(ExplorerError::Boundary(
            "offset must be at least 1".to_string(),
        )),
        Some(offset) => Ok(offset),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::committee::{Committee, Validator, BLS_PUBLIC_KEY_LENGTH};
    use crate::persistence::{
        address_key, write_address, write_block, write_committee, write_head_height,
        write_transaction, MemoryStore, StorageWriter,
    };
    use crate::sharding::NetworkInstance;

    fn schedule() -> EpochSchedule {
        EpochSchedule::new(
            4,
            4,
            vec![
                (0, NetworkInstance::new("v0", 2, 4).unwrap()),
                (2, NetworkInstance::new("v1", 3, 4).unwrap()),
            ],
        )
        .unwrap()
    }

    fn committee(epoch: u64) -> Committee {
        Committee {
            shard_id: 0,
            epoch,
            validators: (0..3u8)
                .map(|i| Validator {
                    ecdsa_address: Address([i + 10 * epoch as u8 + 1; 20]),
                    bls_public_key: vec![i + 1; BLS_PUBLIC_KEY_LENGTH],
                })
                .collect(),
        }
    }

    /// Blocks `0..=head`, epoch boundaries every four blocks.
    fn explorer(head: u64) -> (MemoryStore, Explorer) {
        let store = MemoryStore::new();
        let schedule = schedule();
        for height in 0..=head {
            let block = Block::new(
                height,
                schedule.calc_epoch_number(height),
                0,
                100 + height,
                [0u8; 32],
                vec![],
            )
            .with_last_commit_bitmap(vec![0b0000_0111]);
            write_block(&store, &block).unwrap();
        }
        write_head_height(&store, head).unwrap();
        let explorer = Explorer::new(Arc::new(store.clone()), schedule, 0)
            .with_endpoints("http://s%d", "ws://s%d");
        (store, explorer)
    }

    fn blocks_query(from: &str, to: Option<&str>) -> BlocksQuery {
        BlocksQuery {
            from: Some(from.to_string()),
            to: to.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_blocks_defaults_to_head() {
        let (_, explorer) = explorer(6);
        let never = AtomicBool::new(false);
        let blocks = explorer.blocks(&blocks_query("2", None), &never).unwrap();
        assert_eq!(
            blocks.iter().map(|b| b.height.as_str()).collect::<Vec<_>>(),
            vec!["2", "3", "4", "5", "6"]
        );
    }

    #[test]
    fn test_blocks_pagination() {
        let (_, explorer) = explorer(30);
        let never = AtomicBool::new(false);
        let query = BlocksQuery {
            page: Some("1".to_string()),
            offset: Some("4".to_string()),
            ..blocks_query("0", Some("30"))
        };
        let blocks = explorer.blocks(&query, &never).unwrap();
        assert_eq!(
            blocks.iter().map(|b| b.height.as_str()).collect::<Vec<_>>(),
            vec!["4", "5", "6", "7"]
        );
    }

    #[test]
    fn test_blocks_rejects_bad_parameters() {
        let (_, explorer) = explorer(6);
        let never = AtomicBool::new(false);
        let rejects = |query: BlocksQuery| {
            matches!(
                explorer.blocks(&query, &never),
                Err(ExplorerError::Boundary(_))
            )
        };

        assert!(rejects(BlocksQuery::default()));
        assert!(rejects(blocks_query("-1", Some("3"))));
        assert!(rejects(blocks_query("abc", Some("3"))));
        assert!(rejects(blocks_query("5", Some("3"))));
        assert!(rejects(BlocksQuery {
            offset: Some("0".to_string()),
            ..blocks_query("1", Some("3"))
        }));
        assert!(rejects(BlocksQuery {
            page: Some("x".to_string()),
            ..blocks_query("1", Some("3"))
        }));
    }

    #[test]
    fn test_blocks_window_limit() {
        let (store, _) = explorer(2);
        let explorer = Explorer::new(Arc::new(store), schedule(), 0).with_limits(10, 5);
        let never = AtomicBool::new(false);
        assert!(explorer.blocks(&blocks_query("0", Some("4")), &never).is_ok());
        assert!(matches!(
            explorer.blocks(&blocks_query("0", Some("5")), &never),
            Err(ExplorerError::Boundary(_))
        ));
        assert!(matches!(
            explorer.blocks(&blocks_query("0", Some(u64::MAX.to_string().as_str())), &never),
            Err(ExplorerError::Boundary(_))
        ));
    }

    #[test]
    fn test_blocks_at_top_of_height_range() {
        let (_, explorer) = explorer(2);
        let never = AtomicBool::new(false);
        let max = u64::MAX.to_string();
        let before_max = (u64::MAX - 1).to_string();

        assert!(matches!(
            explorer.blocks(&blocks_query(&max, Some(&max)), &never),
            Err(ExplorerError::Boundary(_))
        ));
        assert!(explorer
            .blocks(&blocks_query(&before_max, Some(&before_max)), &never)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_check_window() {
        assert!(check_window(0, 9, 10).is_ok());
        assert!(check_window(5, 5, 1).is_ok());
        assert!(matches!(check_window(0, 10, 10), Err(ExplorerError::Boundary(_))));
        assert!(matches!(check_window(4, 3, 10), Err(ExplorerError::Boundary(_))));
        assert!(matches!(
            check_window(0, 1_000_000_000_000, 10_000),
            Err(ExplorerError::Boundary(_))
        ));
        assert!(matches!(
            check_window(u64::MAX, u64::MAX, 10),
            Err(ExplorerError::Boundary(_))
        ));
    }

    #[test]
    fn test_blocks_on_empty_chain() {
        let explorer = Explorer::new(Arc::new(MemoryStore::new()), schedule(), 0);
        let never = AtomicBool::new(false);
        assert!(explorer.blocks(&blocks_query("0", None), &never).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_lookup() {
        let (store, explorer) = explorer(1);
        let view = TransactionView {
            id: "0xabc".to_string(),
            timestamp: "1000".to_string(),
            from: "one1from".to_string(),
            to: "one1to".to_string(),
            value: "5".to_string(),
            bytes: "100".to_string(),
            data: String::new(),
            gas_fee: "21000".to_string(),
            from_shard: 0,
            to_shard: 0,
            kind: String::new(),
        };
        write_transaction(&store, &view).unwrap();

        let found = explorer
            .transaction(&TransactionQuery { id: Some("0xABC".to_string()) })
            .unwrap();
        assert_eq!(found, view);

        let missing = explorer.transaction(&TransactionQuery { id: Some("0xdef".to_string()) });
        assert!(missing.unwrap_err().is_not_found());
        assert!(matches!(
            explorer.transaction(&TransactionQuery::default()),
            Err(ExplorerError::Boundary(_))
        ));
    }

    #[test]
    fn test_address_views() {
        let (store, explorer) = explorer(1);
        let address = Address([7u8; 20]);
        let tx = |i: usize, kind: &str| TransactionView {
            id: format!("0x{:02x}", i),
            timestamp: "0".to_string(),
            from: String::new(),
            to: String::new(),
            value: i.to_string(),
            bytes: "0".to_string(),
            data: String::new(),
            gas_fee: "0".to_string(),
            from_shard: 0,
            to_shard: 0,
            kind: kind.to_string(),
        };
        let record = AddressRecord {
            id: address.to_hex(),
            balance: "42".to_string(),
            transactions: (0..6)
                .map(|i| tx(i, if i % 2 == 0 { RECEIVED } else { SENT }))
                .collect(),
        };
        write_address(&store, &address, &record).unwrap();
        let id = Bech32Codec::default().encode(&address).unwrap();
        let query = |view: Option<&str>| AddressQuery {
            id: Some(id.clone()),
            tx_view: view.map(str::to_string),
            ..Default::default()
        };

        let none = explorer.address(&query(None)).unwrap();
        assert_eq!(none.id, id);
        assert_eq!(none.balance, "42");
        assert!(none.transactions.is_empty());

        assert_eq!(explorer.address(&query(Some("ALL"))).unwrap().transactions.len(), 6);
        let sent = explorer.address(&query(Some("SENT"))).unwrap();
        assert!(sent.transactions.iter().all(|t| t.kind == SENT));
        assert_eq!(sent.transactions.len(), 3);

        let paged = explorer
            .address(&AddressQuery {
                page: Some("1".to_string()),
                offset: Some("2".to_string()),
                ..query(Some("RECEIVED"))
            })
            .unwrap();
        assert_eq!(
            paged.transactions.iter().map(|t| t.value.as_str()).collect::<Vec<_>>(),
            vec!["4"]
        );

        assert!(matches!(
            explorer.address(&query(Some("BOTH"))),
            Err(ExplorerError::Boundary(_))
        ));
    }

    #[test]
    fn test_unknown_address_is_empty_record() {
        let (_, explorer) = explorer(1);
        let id = Address([9u8; 20]).to_hex();
        let record = explorer
            .address(&AddressQuery {
                id: Some(id.clone()),
                tx_view: Some("ALL".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(record.id, id);
        assert!(record.transactions.is_empty());

        assert!(matches!(
            explorer.address(&AddressQuery {
                id: Some("bogus".to_string()),
                ..Default::default()
            }),
            Err(ExplorerError::Boundary(_))
        ));
    }

    #[test]
    fn test_committee_current_epoch_and_shard_check() {
        let (store, explorer) = explorer(9);
        write_committee(&store, &committee(2)).unwrap();
        let funded = committee(2).validators[1].ecdsa_address;
        write_address(
            &store,
            &funded,
            &AddressRecord {
                id: funded.to_hex(),
                balance: "777".to_string(),
                transactions: vec![],
            },
        )
        .unwrap();

        let view = explorer.committee(&CommitteeQuery::default()).unwrap();
        assert_eq!(view.epoch, 2);
        assert_eq!(view.validators.len(), 3);
        let codec = Bech32Codec::default();
        assert_eq!(
            view.validators[0].address,
            codec.encode(&committee(2).validators[0].ecdsa_address).unwrap()
        );
        assert_eq!(view.validators[0].balance, "0");
        assert_eq!(view.validators[1].balance, "777");

        let unreadable = committee(2).validators[2].ecdsa_address;
        store.put(address_key(&unreadable).as_bytes(), b"junk").unwrap();
        let view = explorer.committee(&CommitteeQuery::default()).unwrap();
        assert_eq!(view.validators.len(), 2);

        assert!(matches!(
            explorer.committee(&CommitteeQuery {
                shard_id: Some("1".to_string()),
                epoch: None,
            }),
            Err(ExplorerError::Boundary(_))
        ));
    }

    #[test]
    fn test_committee_falls_back_to_epoch_boundary_headers() {
        let (store, explorer) = explorer(9);
        // epoch 1 starts at height 4; the previous epoch ends at height 3
        let mut last = read_block(&store, 3).unwrap();
        last.header.shard_state = Some(vec![committee(1)]);
        write_block(&store, &last).unwrap();

        let view = explorer
            .committee(&CommitteeQuery {
                shard_id: None,
                epoch: Some("1".to_string()),
            })
            .unwrap();
        assert_eq!(view.epoch, 1);
        assert_eq!(view.validators.len(), 3);

        let empty = explorer
            .committee(&CommitteeQuery {
                shard_id: Some("0".to_string()),
                epoch: Some("7".to_string()),
            })
            .unwrap();
        assert!(empty.validators.is_empty());
    }

    #[test]
    fn test_sharding_structure_follows_current_epoch() {
        let (_, early) = explorer(3);
        assert_eq!(early.sharding_structure().unwrap().len(), 2);

        let (_, late) = explorer(9);
        let shards = late.sharding_structure().unwrap();
        assert_eq!(shards.len(), 3);
        assert!(shards[0].current);
        assert_eq!(shards[2].http, "http://s2");
    }
}
