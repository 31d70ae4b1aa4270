use xmr_wallet::address::base58;
use xmr_wallet::{generate_key_pair, Address, AddressError, AddressType, Network};

fn sample(network: Network) -> Address {
    generate_key_pair().address(network)
}

#[test]
fn text_form_round_trips() {
    for network in [Network::Mainnet, Network::Stagenet, Network::Dev] {
        let address = sample(network);
        let text = address.to_string();
        assert_eq!(text.len(), 95);
        let parsed: Address = text.parse().unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.to_string(), text);
        assert_eq!(parsed.address_type(), AddressType::Standard);
    }
}

#[test]
fn keys_survive_encoding() {
    let keys = generate_key_pair();
    let address = keys.address(Network::Stagenet);
    assert_eq!(address.public_key_pair().unwrap(), keys.public_key_pair());
}

#[test]
fn wrong_byte_length_is_a_length_error() {
    let bytes = sample(Network::Mainnet).to_bytes();
    for len in [0usize, 1, 68, 70, 138] {
        let buffer: Vec<u8> = bytes.iter().copied().cycle().take(len).collect();
        assert_eq!(
            Address::from_bytes(&buffer),
            Err(AddressError::Length {
                expected: 69,
                got: len
            })
        );
    }
}

#[test]
fn flipped_checksum_byte_is_a_checksum_error() {
    let bytes = sample(Network::Stagenet).to_bytes();
    for index in 65..69 {
        let mut tampered = bytes;
        tampered[index] ^= 0x01;
        assert_eq!(Address::from_bytes(&tampered), Err(AddressError::Checksum));
    }
}

#[test]
fn unknown_prefix_is_a_prefix_error() {
    let mut bytes = sample(Network::Mainnet).to_bytes();
    bytes[0] = 0x07;
    // recompute the checksum so only the prefix is wrong
    let digest = {
        use sha3::{Digest, Keccak256};
        Keccak256::digest(&bytes[..65])
    };
    bytes[65..].copy_from_slice(&digest[..4]);
    assert_eq!(
        Address::from_bytes(&bytes),
        Err(AddressError::UnknownPrefix(0x07))
    );
}

#[test]
fn text_with_wrong_length_is_rejected_before_decoding() {
    let text = sample(Network::Mainnet).to_string();
    assert!(matches!(
        text[..94].parse::<Address>(),
        Err(AddressError::Length { expected: 95, got: 94 })
    ));
}

#[test]
fn network_validation() {
    let mainnet = sample(Network::Mainnet);
    let stagenet = sample(Network::Stagenet);
    assert!(mainnet.validate_network(Network::Mainnet).is_ok());
    assert!(mainnet.validate_network(Network::Dev).is_ok());
    assert!(stagenet.validate_network(Network::Stagenet).is_ok());
    assert_eq!(
        stagenet.validate_network(Network::Mainnet),
        Err(AddressError::NetworkMismatch {
            expected: "mainnet",
            got: "stagenet"
        })
    );

    let testnet = generate_key_pair().public_key_pair().address(Network::Testnet);
    assert_eq!(testnet.network(), Network::Testnet);
    assert!(testnet.validate_network(Network::Testnet).is_err());
}

#[test]
fn serde_uses_text_form() {
    let address = sample(Network::Stagenet);
    let json = serde_json::to_string(&address).unwrap();
    assert_eq!(json, format!("\"{address}\""));
    let back: Address = serde_json::from_str(&json).unwrap();
    assert_eq!(back, address);
}

#[test]
fn base58_matches_block_layout() {
    let bytes = sample(Network::Mainnet).to_bytes();
    let text = base58::encode(&bytes);
    assert_eq!(base58::decode(&text).unwrap(), bytes.to_vec());
}
