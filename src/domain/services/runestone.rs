//! Minimal runestone decoder: enough to classify rune transactions and read
//! etched names and mint targets.

use bitcoincore_rpc::bitcoin::blockdata::opcodes::all::{OP_PUSHNUM_13, OP_RETURN};
use bitcoincore_rpc::bitcoin::blockdata::script::Instruction;
use bitcoincore_rpc::bitcoin::Transaction;

const TAG_BODY: u128 = 0;
const TAG_FLAGS: u128 = 2;
const TAG_RUNE: u128 = 4;
const TAG_MINT: u128 = 20;
const TAG_CENOTAPH: u128 = 126;
const KNOWN_EVEN_TAGS: [u128; 12] = [0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22];

const FLAG_ETCHING: u128 = 1;
const MAX_VARINT_BYTES: usize = 19;

/// Placeholder identifier for an etching that lets the protocol assign a name
pub const RESERVED_RUNE: &str = "RESERVED";

/// Decoded `OP_RETURN OP_13` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Runestone(Runestone),
    Cenotaph,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Runestone {
    pub etching: Option<String>,
    /// Rune id being minted, `block:tx`
    pub mint: Option<String>,
    pub has_edicts: bool,
}

/// Find and decode the first runestone output of a transaction
pub fn decipher(tx: &Transaction) -> Option<Artifact> {
    let payload = tx.output.iter().find_map(|output| {
        let mut instructions = output.script_pubkey.instructions();
        match (instructions.next(), instructions.next()) {
            (Some(Ok(Instruction::Op(first))), Some(Ok(Instruction::Op(second))))
                if first == OP_RETURN && second == OP_PUSHNUM_13 =>
            {
                let mut payload = Vec::new();
                for instruction in instructions {
                    match instruction {
                        Ok(Instruction::PushBytes(push)) => payload.extend_from_slice(push.as_bytes()),
                        _ => return Some(None),
                    }
                }
                Some(Some(payload))
            }
            _ => None,
        }
    })?;

    let Some(payload) = payload else {
        return Some(Artifact::Cenotaph);
    };

    Some(parse_payload(&payload).map_or(Artifact::Cenotaph, Artifact::Runestone))
}

fn parse_payload(payload: &[u8]) -> Option<Runestone> {
    let integers = decode_integers(payload)?;

    let mut runestone = Runestone::default();
    let mut flags = 0u128;
    let mut mint_parts = Vec::new();

    let mut index = 0;
    while index < integers.len() {
        let tag = integers[index];
        if tag == TAG_BODY {
            let edicts = &integers[index + 1..];
            if edicts.len() % 4 != 0 {
                return None;
            }
            runestone.has_edicts = !edicts.is_empty();
            break;
        }

        let value = *integers.get(index + 1)?;
        match tag {
            TAG_FLAGS => flags |= value,
            TAG_RUNE => runestone.etching = Some(rune_name(value)),
            TAG_MINT => mint_parts.push(value),
            TAG_CENOTAPH => return None,
            tag if tag % 2 == 0 && !KNOWN_EVEN_TAGS.contains(&tag) => return None,
            _ => {}
        }
        index += 2;
    }

    if flags & FLAG_ETCHING != 0 {
        if runestone.etching.is_none() {
            runestone.etching = Some(RESERVED_RUNE.to_string());
        }
    } else {
        runestone.etching = None;
    }

    match mint_parts.as_slice() {
        [] => {}
        [block, tx] => runestone.mint = Some(format!("{}:{}", block, tx)),
        _ => return None,
    }

    Some(runestone)
}

fn decode_integers(payload: &[u8]) -> Option<Vec<u128>> {
    let mut integers = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let (value, used) = decode_varint(rest)?;
        integers.push(value);
        rest = &rest[used..];
    }
    Some(integers)
}

/// LEB128 decode; `None` on truncation or overflow
fn decode_varint(bytes: &[u8]) -> Option<(u128, usize)> {
    let mut value = 0u128;
    for (i, byte) in bytes.iter().enumerate().take(MAX_VARINT_BYTES) {
        let part = u128::from(byte & 0x7f);
        value = value.checked_add(part.checked_shl(7 * i as u32)?)?;
        if i == MAX_VARINT_BYTES - 1 && part > 0b11 {
            return None;
        }
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Bijective base-26 rune name (0 = A, 25 = Z, 26 = AA)
fn rune_name(mut n: u128) -> String {
    let mut name = Vec::new();
    n = n.saturating_add(1);
    while n > 0 {
        let digit = ((n - 1) % 26) as u8;
        name.push(b'A' + digit);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bitcoincore_rpc::bitcoin::absolute::LockTime;
    use bitcoincore_rpc::bitcoin::blockdata::script::{Builder, PushBytesBuf};
    use bitcoincore_rpc::bitcoin::{ScriptBuf, TxOut};

    pub(crate) fn encode_varint(mut n: u128, out: &mut Vec<u8>) {
        while n >> 7 > 0 {
            out.push((n as u8 & 0x7f) | 0x80);
            n >>= 7;
        }
        out.push(n as u8);
    }

    /// Runestone output script for the given integer sequence
    pub(crate) fn runestone_script(integers: &[u128]) -> ScriptBuf {
        let mut payload = Vec::new();
        for n in integers {
            encode_varint(*n, &mut payload);
        }
        let data = PushBytesBuf::try_from(payload).unwrap();
        Builder::new()
            .push_opcode(OP_RETURN)
            .push_opcode(OP_PUSHNUM_13)
            .push_slice(data)
            .into_script()
    }

    pub(crate) fn tx_with_output(script_pubkey: ScriptBuf) -> Transaction {
        Transaction {
            version: 2,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: 0,
                script_pubkey,
            }],
        }
    }

    #[test]
    fn test_decodes_mint() {
        let tx = tx_with_output(runestone_script(&[TAG_MINT, 840000, TAG_MINT, 3]));
        let Some(Artifact::Runestone(runestone)) = decipher(&tx) else {
            panic!("expected runestone");
        };
        assert_eq!(runestone.mint.as_deref(), Some("840000:3"));
        assert_eq!(runestone.etching, None);
    }

    #[test]
    fn test_decodes_named_etching() {
        // 0 = A, 26 = AA
        let tx = tx_with_output(runestone_script(&[TAG_FLAGS, FLAG_ETCHING, TAG_RUNE, 26]));
        let Some(Artifact::Runestone(runestone)) = decipher(&tx) else {
            panic!("expected runestone");
        };
        assert_eq!(runestone.etching.as_deref(), Some("AA"));
    }

    #[test]
    fn test_etching_without_name_is_reserved() {
        let tx = tx_with_output(runestone_script(&[TAG_FLAGS, FLAG_ETCHING]));
        let Some(Artifact::Runestone(runestone)) = decipher(&tx) else {
            panic!("expected runestone");
        };
        assert_eq!(runestone.etching.as_deref(), Some(RESERVED_RUNE));
    }

    #[test]
    fn test_edicts_mark_transfer() {
        let tx = tx_with_output(runestone_script(&[TAG_BODY, 840000, 3, 100, 1]));
        let Some(Artifact::Runestone(runestone)) = decipher(&tx) else {
            panic!("expected runestone");
        };
        assert!(runestone.has_edicts);
    }

    #[test]
    fn test_unknown_even_tag_is_cenotaph() {
        let tx = tx_with_output(runestone_script(&[24, 1]));
        assert_eq!(decipher(&tx), Some(Artifact::Cenotaph));

        let truncated = tx_with_output(runestone_script(&[TAG_BODY, 1, 2]));
        assert_eq!(decipher(&truncated), Some(Artifact::Cenotaph));
    }

    #[test]
    fn test_plain_op_return_is_not_a_runestone() {
        let script = Builder::new().push_opcode(OP_RETURN).into_script();
        assert_eq!(decipher(&tx_with_output(script)), None);
    }

    #[test]
    fn test_rune_names() {
        assert_eq!(rune_name(0), "A");
        assert_eq!(rune_name(25), "Z");
        assert_eq!(rune_name(27), "AB");
    }
}
