//! End-to-end scenario: two websocket clients with disjoint transaction
//! filters each see only their own matching transactions in a connected
//! block (spec §8 scenario 5, spec §4.8 "filteredblockconnected").
use std::time::Duration;

use crossbeam_channel as chan;
use glyphchain_rpc::notifier::{ClientMessage, ControlMessage, Notification, Notifier, TxFilter};
use glyphchain_wire::{Block, BlockHash, BlockHeader, OutPoint, Script, Transaction, TxIn, TxOut};

fn p2pkh_script(hash: [u8; 20]) -> Script {
    let mut bytes = vec![0x76, 0xa9, 0x14];
    bytes.extend_from_slice(&hash);
    bytes.push(0x88);
    bytes.push(0xac);
    Script(bytes)
}

fn paying_tx(hash: [u8; 20]) -> Transaction {
    Transaction {
        version: 1,
        input: vec![TxIn {
            previous_output: OutPoint { txid: glyphchain_wire::Txid::all_zeros(), vout: 0 },
            script_sig: Script(Vec::new()),
            sequence: 0xffff_ffff,
            witness: Vec::new(),
        }],
        output: vec![TxOut { value: 5000, script_pubkey: p2pkh_script(hash) }],
        lock_time: 0,
    }
}

fn recv_block_connected(rx: &chan::Receiver<ClientMessage>) -> Vec<String> {
    match rx.recv_timeout(Duration::from_millis(50)) {
        Ok(ClientMessage::BlockConnected { filtered_txs, .. }) => filtered_txs,
        Ok(_) => panic!("expected a BlockConnected message"),
        Err(err) => panic!("did not receive a message: {err}"),
    }
}

#[test]
fn clients_with_disjoint_filters_see_only_their_own_transactions() {
    let (control, _join) = Notifier::default().spawn();

    let (send_a, recv_a) = chan::unbounded();
    let (send_b, recv_b) = chan::unbounded();
    let (reply_a, ack_a) = chan::unbounded();
    let (reply_b, ack_b) = chan::unbounded();

    control.send(ControlMessage::Register { id: 1, admin: false, send: send_a, reply: reply_a }).unwrap();
    ack_a.recv_timeout(Duration::from_millis(50)).unwrap();
    control.send(ControlMessage::Register { id: 2, admin: false, send: send_b, reply: reply_b }).unwrap();
    ack_b.recv_timeout(Duration::from_millis(50)).unwrap();

    let hash_a = [0xaa; 20];
    let hash_b = [0xbb; 20];
    let mut filter_a = TxFilter::default();
    filter_a.pubkey_hash.insert(hash_a);
    let mut filter_b = TxFilter::default();
    filter_b.pubkey_hash.insert(hash_b);

    control.send(ControlMessage::LoadTxFilter(1, filter_a)).unwrap();
    control.send(ControlMessage::LoadTxFilter(2, filter_b)).unwrap();
    control.send(ControlMessage::NotifyBlocks(1)).unwrap();
    control.send(ControlMessage::NotifyBlocks(2)).unwrap();

    let tx_a = paying_tx(hash_a);
    let tx_b = paying_tx(hash_b);
    let header = BlockHeader { version: 1, prev_blockhash: BlockHash::all_zeros(), merkle_root: BlockHash::all_zeros(), time: 0, bits: 0x207f_ffff, nonce: 0 };
    let block = Block { header, txdata: vec![tx_a.clone(), tx_b.clone()] };

    control.send(ControlMessage::Notify(Notification::BlockConnected(block))).unwrap();

    let seen_by_a = recv_block_connected(&recv_a);
    let seen_by_b = recv_block_connected(&recv_b);

    let tx_a_hex = hex_encode(&glyphchain_wire::encode::serialize(&tx_a));
    let tx_b_hex = hex_encode(&glyphchain_wire::encode::serialize(&tx_b));

    assert_eq!(seen_by_a, vec![tx_a_hex]);
    assert_eq!(seen_by_b, vec![tx_b_hex]);

    control.send(ControlMessage::Shutdown).unwrap();
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
