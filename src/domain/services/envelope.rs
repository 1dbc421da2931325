//! Taproot envelope extraction (`OP_FALSE OP_IF <protocol> ... OP_ENDIF`).

use bitcoincore_rpc::bitcoin::blockdata::opcodes::all::{OP_ENDIF, OP_IF};
use bitcoincore_rpc::bitcoin::blockdata::script::Instruction;
use bitcoincore_rpc::bitcoin::{Script, TxIn};

const ANNEX_TAG: u8 = 0x50;
const CONTENT_TYPE_TAG: &[u8] = &[1];

/// A data envelope found in a tapscript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Protocol marker pushed right after `OP_IF` (`ord`, `atom`, ...)
    pub protocol: Vec<u8>,
    /// All pushes between the protocol marker and `OP_ENDIF`
    pub payload: Vec<Vec<u8>>,
    /// Size of the tapscript that carries the envelope
    pub envelope_size: usize,
}

impl Envelope {
    /// Content type tag of an ordinal inscription
    pub fn content_type(&self) -> Option<&[u8]> {
        let mut fields = self.fields();
        fields
            .find(|(tag, _)| tag.as_slice() == CONTENT_TYPE_TAG)
            .map(|(_, value)| value)
    }

    /// Concatenated pushes after the `OP_0` body separator
    pub fn body(&self) -> Vec<u8> {
        self.payload
            .iter()
            .skip_while(|push| !push.is_empty())
            .skip(1)
            .flatten()
            .copied()
            .collect()
    }

    /// First push after the protocol marker (the atomicals operation)
    pub fn operation(&self) -> Option<&[u8]> {
        self.payload.first().map(Vec::as_slice)
    }

    fn fields(&self) -> impl Iterator<Item = (&Vec<u8>, &[u8])> {
        let header: Vec<&Vec<u8>> = self.payload.iter().take_while(|push| !push.is_empty()).collect();
        header
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1].as_slice()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Script-path spend script of a taproot input, if any
pub fn tapscript(input: &TxIn) -> Option<&Script> {
    let mut elements: Vec<&[u8]> = input.witness.iter().collect();
    if elements.len() >= 2 && elements.last().and_then(|last| last.first()) == Some(&ANNEX_TAG) {
        elements.pop();
    }
    if elements.len() < 2 {
        return None;
    }
    Some(Script::from_bytes(elements[elements.len() - 2]))
}

/// Every envelope in the input's tapscript, in script order
pub fn envelopes(input: &TxIn) -> Vec<Envelope> {
    let Some(script) = tapscript(input) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    let mut instructions = script.instructions();
    let mut previous_was_false = false;

    while let Some(Ok(instruction)) = instructions.next() {
        match instruction {
            Instruction::Op(op) if op == OP_IF && previous_was_false => {
                previous_was_false = false;
                let Some(Ok(Instruction::PushBytes(marker))) = instructions.next() else {
                    continue;
                };
                let protocol = marker.as_bytes().to_vec();
                let mut payload = Vec::new();
                let mut closed = false;
                for next in instructions.by_ref() {
                    match next {
                        Ok(Instruction::PushBytes(push)) => payload.push(push.as_bytes().to_vec()),
                        Ok(Instruction::Op(op)) if op == OP_ENDIF => {
                            closed = true;
                            break;
                        }
                        Ok(Instruction::Op(op)) => match push_num(op.to_u8()) {
                            Some(value) => payload.push(value),
                            None => break,
                        },
                        Err(_) => break,
                    }
                }
                if closed {
                    found.push(Envelope {
                        protocol,
                        payload,
                        envelope_size: script.len(),
                    });
                }
            }
            Instruction::PushBytes(push) => previous_was_false = push.as_bytes().is_empty(),
            Instruction::Op(_) => previous_was_false = false,
        }
    }

    found
}

/// Value pushed by OP_PUSHNUM_1..=OP_PUSHNUM_16
fn push_num(opcode: u8) -> Option<Vec<u8>> {
    match opcode {
        0x51..=0x60 => Some(vec![opcode - 0x50]),
        _ => None,
    }
}
