#![allow(non_snake_case)]

mod harness;

use bitcoin::Txid;

use vault::coinselect::Output;
use vault::store::model::{AccountRow, ScriptStatus, TxRow, TxStatus};
use vault::Vault;

use harness::{
    build_funding_tx, build_merkle_block, external_output_script, open_vault, K1_ENTROPY, K1_PASS, K2_ENTROPY,
    K2_PASS, K3_ENTROPY, K3_PASS,
};

/// `k1,k2,k3` from the literal entropies, a 2-of-3 account `A` over them,
/// every keychain's chain code unlocked for the rest of the scenario
/// (`spec.md` §8 S1).
fn arrange_account(vault: &Vault) -> AccountRow {
    vault.new_keychain("k1", &K1_ENTROPY, K1_PASS).expect("new k1");
    vault.new_keychain("k2", &K2_ENTROPY, K2_PASS).expect("new k2");
    vault.new_keychain("k3", &K3_ENTROPY, K3_PASS).expect("new k3");
    vault.unlock_keychain("k1", K1_PASS).expect("unlock k1");
    vault.unlock_keychain("k2", K2_PASS).expect("unlock k2");
    vault.unlock_keychain("k3", K3_PASS).expect("unlock k3");

    vault
        .new_account("A", 2, &["k1".to_string(), "k2".to_string(), "k3".to_string()], None, 1_600_000_000)
        .expect("new_account")
}

#[test]
fn e2e_account_creation_and_issuance() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = open_vault(dir.path());

    // Act
    let account = arrange_account(&vault);
    let bins = vault.list_bins("A").expect("list_bins");
    let default_script = vault.issue_signing_script("A", "@default", "invoice-1").expect("issue_signing_script");

    // Assert
    assert_eq!(account.keychain_ids.len(), 3);
    assert_eq!(bins.len(), 2);
    let change_bin = bins.iter().find(|b| b.name == "@change").expect("@change bin exists");
    let default_bin = bins.iter().find(|b| b.name == "@default").expect("@default bin exists");
    assert_eq!(change_bin.index, 1);
    assert_eq!(default_bin.index, 2);

    let change_pool = vault.list_scripts("A", Some("@change"), ScriptStatus::UNUSED).unwrap();
    assert_eq!(change_pool.len(), 25);
    let default_pool = vault.list_scripts("A", Some("@default"), ScriptStatus::UNUSED).unwrap();
    assert_eq!(default_pool.len(), 25, "pool refills to 25 after the issuance consumed one slot");

    assert_eq!(default_script.index, 0);
    assert_eq!(default_script.status, ScriptStatus::ISSUED);
    assert_eq!(default_script.label, "invoice-1");

    let mut k1 = vault.get_keychain("k1").unwrap();
    let mut k2 = vault.get_keychain("k2").unwrap();
    let mut k3 = vault.get_keychain("k3").unwrap();
    k1.unlock_chain_code(K1_PASS).unwrap();
    k2.unlock_chain_code(K2_PASS).unwrap();
    k3.unlock_chain_code(K3_PASS).unwrap();
    let mut expected_pubkeys = vec![
        k1.signing_pubkey(&[default_bin.index], 0).unwrap().serialize().to_vec(),
        k2.signing_pubkey(&[default_bin.index], 0).unwrap().serialize().to_vec(),
        k3.signing_pubkey(&[default_bin.index], 0).unwrap().serialize().to_vec(),
    ];
    expected_pubkeys.sort();
    assert_eq!(default_script.pubkeys, expected_pubkeys);

    let redeem_script = vault::script::build_redeem_script(2, &default_script.pubkeys);
    let expected_txout_script = vault::script::build_txout_script(&redeem_script);
    assert_eq!(default_script.txout_script, expected_txout_script.into_bytes());
}

/// Builds on S1: issues the `@default` invoice script and leaves the vault
/// ready for a funding transaction to arrive.
fn setup_s1(vault: &Vault) -> (AccountRow, vault::store::model::SigningScriptRow) {
    let account = arrange_account(vault);
    let script = vault.issue_signing_script("A", "@default", "invoice-1").expect("issue_signing_script");
    (account, script)
}

#[test]
fn e2e_receive_and_confirm() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = open_vault(dir.path());
    let (account, script) = setup_s1(&vault);

    // Act: a raw transaction T1 pays 100_000_000 sats to the issued script.
    let t1_raw = build_funding_tx(&script.txout_script, 100_000_000);
    let t1 = vault.insert_tx(&t1_raw, 1_600_000_100, TxStatus::RECEIVED).expect("insert_tx T1");

    // Assert (post-receive, pre-confirmation)
    assert_eq!(t1.status, TxStatus::RECEIVED);
    let used = vault.list_scripts("A", Some("@default"), ScriptStatus::USED).unwrap();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].index, script.index);
    let unused = vault.list_scripts("A", Some("@default"), ScriptStatus::UNUSED).unwrap();
    assert_eq!(unused.len(), 25, "pool stays topped up after the receive consumed the issued slot");
    assert_eq!(vault.balance("A", 0).unwrap(), 100_000_000);
    assert_eq!(vault.balance("A", 1).unwrap(), 0);

    // Act: a merkle block at height 500000 confirms T1.
    let merkle_raw = build_merkle_block(Txid::from_hash(bitcoin::hashes::Hash::from_inner(t1.hash.unwrap())), 500_000);
    vault.insert_merkle_block(&merkle_raw, 500_000).expect("insert_merkle_block");

    // Assert (post-confirmation)
    let t1 = vault.get_tx(t1.id).expect("get_tx T1");
    assert_eq!(t1.status, TxStatus::CONFIRMED);
    let header = vault.get_block_header(500_000).expect("get_block_header");
    assert_eq!(header.height, 500_000);
    assert_eq!(vault.best_height().unwrap(), Some(500_000));
    assert_eq!(vault.balance("A", 1).unwrap(), 100_000_000);
    assert_eq!(account.name, "A");
}

/// Builds on S2: T1 is received and confirmed at height 500000.
fn setup_s2(vault: &Vault) -> (AccountRow, TxRow) {
    let (_account, script) = setup_s1(vault);
    let t1_raw = build_funding_tx(&script.txout_script, 100_000_000);
    let t1 = vault.insert_tx(&t1_raw, 1_600_000_100, TxStatus::RECEIVED).expect("insert_tx T1");
    let merkle_raw = build_merkle_block(Txid::from_hash(bitcoin::hashes::Hash::from_inner(t1.hash.unwrap())), 500_000);
    vault.insert_merkle_block(&merkle_raw, 500_000).expect("insert_merkle_block");
    let account = vault.account_info("A").expect("account_info");
    let t1 = vault.get_tx(t1.id).expect("get_tx T1");
    (account, t1)
}

#[test]
fn e2e_spend_with_fee_and_change() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = open_vault(dir.path());
    let (_account, t1) = setup_s2(&vault);

    // Act
    let outputs = vec![Output {
        script_pubkey: external_output_script().into_bytes(),
        value: 30_000_000,
    }];
    let t2 = vault
        .create_tx("A", 1, 0, &outputs, 10_000, 1, false, 1_600_000_200)
        .expect("create_tx T2");

    // Assert
    assert_eq!(t2.status, TxStatus::UNSIGNED);
    assert_eq!(t2.version, 1);
    assert_eq!(t2.lock_time, 0);
    assert_eq!(t2.input_ids.len(), 1);
    assert_eq!(t2.fee, Some(10_000));

    let req = vault.signing_request(t2.id).expect("signing_request");
    assert_eq!(req.sigs_needed, 2, "missing_sig_count(T2) = 2 for a 2-of-3 placeholder input");
    assert_eq!(req.raw_tx.input.len(), 1);
    assert_eq!(req.raw_tx.input[0].previous_output.txid, Txid::from_inner(t1.hash.unwrap()));
    assert_eq!(req.raw_tx.input[0].previous_output.vout, 0);

    let total_out: u64 = req.raw_tx.output.iter().map(|o| o.value).sum();
    assert_eq!(total_out, 99_990_000);
    assert!(req.raw_tx.output.iter().any(|o| o.value == 30_000_000));
    assert!(req.raw_tx.output.iter().any(|o| o.value == 69_990_000));

    let change = vault.list_scripts("A", Some("@change"), ScriptStatus::CHANGE).expect("list change scripts");
    assert_eq!(change.len(), 1);
    assert_eq!(change[0].index, 0);
    assert!(req.raw_tx.output.iter().any(|o| o.script_pubkey.to_bytes() == change[0].txout_script));
}

/// Builds on S3: an UNSIGNED T2 spending `T1.outputs[0]`.
fn setup_s3(vault: &Vault) -> (TxRow, TxRow) {
    let (_account, t1) = setup_s2(vault);
    let outputs = vec![Output {
        script_pubkey: external_output_script().into_bytes(),
        value: 30_000_000,
    }];
    let t2 = vault
        .create_tx("A", 1, 0, &outputs, 10_000, 1, false, 1_600_000_200)
        .expect("create_tx T2");
    (t1, t2)
}

#[test]
fn e2e_two_party_signing() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = open_vault(dir.path());
    let (_t1, t2) = setup_s3(&vault);

    // Act: k1 signs first.
    let t2 = vault.sign_tx(t2.id, "k1", None, TxStatus::RECEIVED).expect("sign_tx k1");

    // Assert: one signature short, still unsigned, no hash yet.
    let req = vault.signing_request(t2.id).expect("signing_request after k1");
    assert_eq!(req.sigs_needed, 1);
    assert_eq!(t2.status, TxStatus::UNSIGNED);
    assert!(t2.hash.is_none());

    // Act: k2 signs second, completing the 2-of-3.
    let t2 = vault.sign_tx(t2.id, "k2", None, TxStatus::RECEIVED).expect("sign_tx k2");

    // Assert: fully signed.
    let req = vault.signing_request(t2.id).expect("signing_request after k2");
    assert_eq!(req.sigs_needed, 0);
    assert_eq!(t2.status, TxStatus::RECEIVED);
    assert!(t2.hash.is_some());
    assert_eq!(t2.hash.unwrap(), vault::tx::signed_hash(&req.raw_tx));
}

/// Builds on S4: T2 is fully signed (status RECEIVED, hash defined).
fn setup_s4(vault: &Vault) -> (TxRow, TxRow) {
    let (t1, t2) = setup_s3(vault);
    let t2 = vault.sign_tx(t2.id, "k1", None, TxStatus::RECEIVED).expect("sign_tx k1");
    let t2 = vault.sign_tx(t2.id, "k2", None, TxStatus::RECEIVED).expect("sign_tx k2");
    (t1, t2)
}

#[test]
fn e2e_conflict_detection() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = open_vault(dir.path());
    let (t1, t2) = setup_s4(&vault);

    // Act: T2' independently spends T1.outputs[0] to a different address.
    let t2_prime_raw = bitcoin::Transaction {
        version: 1,
        lock_time: 0,
        input: vec![bitcoin::TxIn {
            previous_output: bitcoin::OutPoint {
                txid: Txid::from_inner(t1.hash.unwrap()),
                vout: 0,
            },
            script_sig: harness::external_scriptsig(),
            sequence: 0xFFFFFFFF,
            witness: Vec::new(),
        }],
        output: vec![bitcoin::TxOut {
            value: 99_000_000,
            script_pubkey: harness::external_output_script(),
        }],
    };
    let t2_prime = vault.insert_tx(&t2_prime_raw, 1_600_000_300, TxStatus::RECEIVED).expect("insert_tx T2'");

    // Assert: one of {T2, T2'} is CONFLICTING (the older, already-stored one yields).
    let t2_after = vault.get_tx(t2.id).expect("get_tx T2");
    assert_eq!(t2_after.status, TxStatus::CONFLICTING);
    assert_eq!(t2_prime.status, TxStatus::RECEIVED);

    // Act: delete T2'.
    vault.delete_tx(t2_prime.id).expect("delete_tx T2'");

    // Assert: T2 returns to its prior status, and T1.outputs[0] points back at it.
    let t2_restored = vault.get_tx(t2.id).expect("get_tx T2 restored");
    assert_eq!(t2_restored.status, TxStatus::RECEIVED);
    assert!(vault.get_tx(t2_prime.id).is_err(), "T2' no longer exists");
}

#[test]
fn e2e_reorg() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let vault = open_vault(dir.path());
    let (_account, t1) = setup_s2(&vault);
    assert_eq!(t1.status, TxStatus::CONFIRMED);
    assert_eq!(vault.balance("A", 0).unwrap(), 100_000_000);
    assert_eq!(vault.balance("A", 1).unwrap(), 100_000_000);

    // Act: the block at height 500000 is reorged out.
    vault.delete_merkle_block(500_000).expect("delete_merkle_block");

    // Assert
    let t1_after = vault.get_tx(t1.id).expect("get_tx T1");
    assert_eq!(t1_after.status, TxStatus::RECEIVED);
    assert!(t1_after.block_header_id.is_none());
    assert_eq!(vault.balance("A", 1).unwrap(), 0);
    assert_eq!(vault.balance("A", 0).unwrap(), 100_000_000);
}
