//! Planning and executing consolidations from scan results.

use std::sync::Arc;

use assert_matches::assert_matches;
use key_wallet_recovery::scheme::SCHEME_BIP44;
use key_wallet_recovery::test_utils::{
    MockChainClient, MockKeyDeriver, MockTransactionBuilder, address_for, path_for, test_seed,
};
use key_wallet_recovery::{
    MigrationError, MigrationPlan, Migrator, ScanOptions, ScanResult, Scanner, Seed, SigHashType,
    TxBuilderError, Utxo, create_migration_plan, scheme_by_name,
};
use tokio_util::sync::CancellationToken;

const DESTINATION: &str = "XdestinationAddress";

struct Fixture {
    client: Arc<MockChainClient>,
    deriver: Arc<MockKeyDeriver>,
    builder: Arc<MockTransactionBuilder>,
    migrator: Migrator,
}

impl Fixture {
    fn new() -> Self {
        let client = Arc::new(MockChainClient::new());
        let deriver = Arc::new(MockKeyDeriver::new());
        let builder = Arc::new(MockTransactionBuilder::new());
        let migrator = Migrator::new(client.clone(), deriver.clone(), builder.clone());
        Self {
            client,
            deriver,
            builder,
            migrator,
        }
    }

    fn receive(&self, index: u32) -> String {
        address_for(&test_seed(), &scheme_by_name(SCHEME_BIP44).unwrap(), 0, false, index)
    }

    /// 100,000 sat in 3 UTXOs across receive indices 0 and 2
    fn fund(&self) {
        self.client.add_utxo(&self.receive(0), 40_000);
        self.client.add_utxo(&self.receive(0), 20_000);
        self.client.add_utxo(&self.receive(2), 40_000);
    }

    async fn scan(&self) -> ScanResult {
        let options = ScanOptions::default()
            .with_gap_limit(5)
            .with_extended_gap_limit(5)
            .with_scan_change_addresses(false);
        let scanner = Scanner::new(self.client.clone(), self.deriver.clone(), options);
        scanner
            .scan_scheme_names(&test_seed(), &[SCHEME_BIP44], &CancellationToken::new())
            .await
            .unwrap()
    }

    async fn plan(&self) -> MigrationPlan {
        create_migration_plan(&self.scan().await, DESTINATION, 50).unwrap()
    }
}

#[tokio::test]
async fn test_plan_from_scan() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    assert_eq!(plan.total_input, 100_000);
    assert_eq!(plan.total_utxos, 3);
    assert_eq!(plan.estimated_size, 488);
    assert_eq!(plan.estimated_fee, 25);
    assert_eq!(plan.net_amount, 99_975);
    assert_eq!(plan.destination, DESTINATION);

    let sources: Vec<&str> = plan.sources.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(sources, vec![fixture.receive(0), fixture.receive(2)]);
    assert_eq!(plan.sources[0].balance, 60_000);
    assert_eq!(plan.sources[0].utxo_count, 2);
}

#[tokio::test]
async fn test_execute_consolidates_live_utxos() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    fixture.migrator.validate_plan(&plan).await.unwrap();
    let result = fixture.migrator.execute(&test_seed(), &plan).await.unwrap();

    assert_eq!(result.total_migrated, 99_975);
    assert_eq!(result.fee, 25);
    assert_eq!(result.input_count, 3);
    assert_eq!(result.destination, DESTINATION);
    assert_eq!(result.source_addresses, vec![fixture.receive(0), fixture.receive(2)]);
    assert_eq!(result.txid.len(), 64);

    let built = fixture.builder.built();
    assert_eq!(built.len(), 1);
    assert_eq!(built[0].amount, 99_975);
    assert_eq!(built[0].destination, DESTINATION);
    let amounts: Vec<u64> = built[0].inputs.iter().map(|u| u.amount).collect();
    assert_eq!(amounts, vec![40_000, 20_000, 40_000]);

    // One key per input, derived from that input's source path
    let scheme = scheme_by_name(SCHEME_BIP44).unwrap();
    let path0 = path_for(&scheme, 0, false, 0);
    let path2 = path_for(&scheme, 0, false, 2);
    assert_eq!(
        fixture.deriver.private_key_requests(),
        vec![path0.clone(), path0.clone(), path2.clone()]
    );

    let signed = fixture.builder.signed();
    let indices: Vec<usize> = signed.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(signed[2].1, path2.into_bytes());
    assert!(signed.iter().all(|(_, _, sighash)| *sighash == SigHashType::All));
    assert_eq!(fixture.builder.broadcast_count(), 1);
}

#[tokio::test]
async fn test_execute_uses_live_state_not_the_plan() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    // Index 2 was spent after planning
    fixture.client.spend_all(&fixture.receive(2));

    assert_matches!(
        fixture.migrator.validate_plan(&plan).await,
        Err(MigrationError::StalePlan(_))
    );

    let result = fixture.migrator.execute(&test_seed(), &plan).await.unwrap();
    assert_eq!(result.input_count, 2);
    assert_eq!(result.fee, 17);
    assert_eq!(result.total_migrated, 60_000 - 17);
    assert_eq!(result.source_addresses, vec![fixture.receive(0)]);
}

#[tokio::test]
async fn test_validate_plan_detects_new_funds() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    fixture.client.add_utxo(&fixture.receive(0), 1);
    assert_matches!(
        fixture.migrator.validate_plan(&plan).await,
        Err(MigrationError::StalePlan(msg)) if msg.contains(&fixture.receive(0))
    );
}

#[tokio::test]
async fn test_validate_plan_checks_recorded_total() {
    let fixture = Fixture::new();
    fixture.fund();
    let mut plan = fixture.plan().await;
    fixture.migrator.validate_plan(&plan).await.unwrap();

    // Every source still matches; only the aggregate disagrees
    plan.total_input += 1;
    assert_matches!(
        fixture.migrator.validate_plan(&plan).await,
        Err(MigrationError::StalePlan(msg)) if msg.contains("in total")
    );
}

#[tokio::test]
async fn test_execute_spends_repeated_sources_once() {
    let fixture = Fixture::new();
    fixture.fund();
    let mut plan = fixture.plan().await;
    let repeated = plan.sources[0].clone();
    plan.sources.push(repeated);

    let result = fixture.migrator.execute(&test_seed(), &plan).await.unwrap();

    assert_eq!(result.input_count, 3);
    assert_eq!(result.total_migrated, 99_975);
    assert_eq!(result.source_addresses, vec![fixture.receive(0), fixture.receive(2)]);
    assert_eq!(fixture.builder.built()[0].inputs.len(), 3);

    // The repeat adds nothing to the live total
    fixture.migrator.validate_plan(&plan).await.unwrap();
}

#[tokio::test]
async fn test_execute_rejects_bad_inputs() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    assert_matches!(
        fixture.migrator.execute(&Seed::new(Vec::new()), &plan).await,
        Err(MigrationError::EmptySeed)
    );

    let empty = MigrationPlan {
        sources: Vec::new(),
        ..plan.clone()
    };
    assert_matches!(
        fixture.migrator.execute(&test_seed(), &empty).await,
        Err(MigrationError::EmptyPlan)
    );
    assert_matches!(fixture.migrator.validate_plan(&empty).await, Err(MigrationError::EmptyPlan));

    fixture.client.set_invalid_address(DESTINATION, "bad checksum");
    assert_matches!(
        fixture.migrator.execute(&test_seed(), &plan).await,
        Err(MigrationError::InvalidDestination(reason)) if reason == "bad checksum"
    );

    assert!(fixture.builder.built().is_empty());
    assert_eq!(fixture.builder.broadcast_count(), 0);
}

#[tokio::test]
async fn test_execute_without_live_inputs() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    fixture.client.spend_all(&fixture.receive(0));
    fixture.client.spend_all(&fixture.receive(2));

    assert_matches!(
        fixture.migrator.execute(&test_seed(), &plan).await,
        Err(MigrationError::NoInputs)
    );
}

#[tokio::test]
async fn test_execute_rechecks_dust_on_live_inputs() {
    let fixture = Fixture::new();
    fixture.client.add_utxo(&fixture.receive(0), 200);
    let plan = fixture.plan().await;

    let address = fixture.receive(0);
    let dust: Vec<Utxo> = (0..10).map(|vout| Utxo::new("ab".repeat(32), vout, 1, &address)).collect();
    fixture.client.set_utxos(&address, dust);

    assert_eq!(
        fixture.migrator.execute(&test_seed(), &plan).await,
        Err(MigrationError::Dust {
            fee: 77,
            total_input: 10
        })
    );
    assert!(fixture.builder.built().is_empty());
}

#[tokio::test]
async fn test_failures_abort_before_broadcast() {
    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;

    fixture.builder.fail_sign_at(1);
    assert_matches!(
        fixture.migrator.execute(&test_seed(), &plan).await,
        Err(MigrationError::Transaction(TxBuilderError::Sign { index: 1, .. }))
    );
    assert_eq!(fixture.builder.broadcast_count(), 0);

    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;
    fixture.deriver.fail_private_keys(true);
    assert_matches!(
        fixture.migrator.execute(&test_seed(), &plan).await,
        Err(MigrationError::Derivation(_))
    );
    assert_eq!(fixture.builder.broadcast_count(), 0);

    let fixture = Fixture::new();
    fixture.fund();
    let plan = fixture.plan().await;
    fixture.builder.fail_broadcast(true);
    assert_matches!(
        fixture.migrator.execute(&test_seed(), &plan).await,
        Err(MigrationError::Transaction(TxBuilderError::Broadcast(_)))
    );
    assert_eq!(fixture.builder.broadcast_count(), 0);
}
