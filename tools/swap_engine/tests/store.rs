use alloy_primitives::{Address as EthAddress, B256, U256};
use swap_dleq::{KeyProver, SigmaProver};
use swap_engine::ports::ContractSwap;
use swap_engine::{
    JsonFileStore, MemoryStore, RecoveryRecord, RecoveryStore, RoleKind, SendKeys, Stage,
    SwapTerms,
};
use tempfile::tempdir;

fn record() -> RecoveryRecord {
    let ours = SigmaProver.generate().unwrap();
    let theirs = SigmaProver.generate().unwrap();
    let counterparty = SendKeys::from_key_proof(&theirs, EthAddress::repeat_byte(2))
        .verify(&SigmaProver)
        .unwrap();
    let swap = ContractSwap {
        owner: EthAddress::repeat_byte(2),
        claimer: EthAddress::repeat_byte(3),
        claim_commitment: B256::from(ours.commitment()),
        refund_commitment: B256::from(theirs.commitment()),
        timeout_0: 1_000,
        timeout_1: 2_000,
        asset: EthAddress::ZERO,
        value: U256::from(42u64),
        nonce: U256::from(7u64),
    };
    RecoveryRecord {
        offer_id: B256::repeat_byte(9),
        role: RoleKind::Responder,
        stage: Stage::AssetLocked,
        terms: SwapTerms {
            offer_id: B256::repeat_byte(9),
            eth_value: U256::from(42u64),
            xmr_amount: 1_000,
            asset: EthAddress::ZERO,
        },
        secret: ours.secret().to_hex(),
        counterparty: Some(counterparty),
        swap_id: Some(swap.swap_id()),
        contract: Some(swap),
        shared_spend_key: None,
        restore_height: 90,
        from_block: 12,
        xmr_lock: None,
    }
}

#[test]
fn json_store_round_trips_records() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("swaps")).unwrap();
    let record = record();

    store.save(&record).unwrap();
    let loaded = store.load(&record.offer_id).unwrap().unwrap();
    assert_eq!(loaded, record);
    assert_eq!(loaded.secret().unwrap().to_hex(), record.secret);
    let (swap_id, swap) = loaded.contract().unwrap();
    assert_eq!(swap.swap_id(), swap_id);
}

#[test]
fn json_store_overwrites_in_place() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path()).unwrap();
    let mut record = record();
    store.save(&record).unwrap();
    record.stage = Stage::Claimed;
    store.save(&record).unwrap();

    let loaded = store.load(&record.offer_id).unwrap().unwrap();
    assert_eq!(loaded.stage, Stage::Claimed);
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn missing_record_is_none() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path()).unwrap();
    assert!(store.load(&B256::repeat_byte(1)).unwrap().is_none());
    assert!(MemoryStore::new().load(&B256::repeat_byte(1)).unwrap().is_none());
}

#[test]
fn corrupt_record_is_an_error() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path()).unwrap();
    let offer_id = B256::repeat_byte(4);
    std::fs::write(dir.path().join(format!("{offer_id}.json")), "{").unwrap();
    assert!(store.load(&offer_id).is_err());
}

#[test]
fn records_written_before_lock_tracking_still_load() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path()).unwrap();
    let record = record();
    let mut json = serde_json::to_value(&record).unwrap();
    let fields = json.as_object_mut().unwrap();
    fields.remove("from_block");
    fields.remove("xmr_lock");
    std::fs::write(
        dir.path().join(format!("{}.json", record.offer_id)),
        serde_json::to_string(&json).unwrap(),
    )
    .unwrap();

    let loaded = store.load(&record.offer_id).unwrap().unwrap();
    assert_eq!(loaded.from_block, 0);
    assert_eq!(loaded.xmr_lock, None);
    assert_eq!(loaded.contract().unwrap(), record.contract().unwrap());
}

#[test]
fn record_without_contract_reports_it() {
    let mut record = record();
    record.swap_id = None;
    record.contract = None;
    assert!(record.contract().is_err());
}

#[test]
fn debug_output_hides_key_material() {
    let record = record();
    let printed = format!("{record:?}");
    assert!(!printed.contains(&record.secret));
    assert!(printed.contains("AssetLocked"));
}
