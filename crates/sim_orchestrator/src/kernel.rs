//! Assignment frames for the rescue kernel.
//!
//! Frame layout (big-endian):
//!   00 : u8   tag = `ASSIGNMENT_TAG`
//!   01 : u32  timestep
//!   05 : u32  pair count
//!   09 : (u32 agent, u32 target) * count
//!
//! Agents without a target are not listed.

use anyhow::{bail, ensure};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dcop::{Assignment, EntityId};

pub const ASSIGNMENT_TAG: u8 = 0x41;

const HEADER_LEN: usize = 1 + 4 + 4;
const PAIR_LEN: usize = 4 + 4;

pub fn encode_assignment(time: u32, assignment: &Assignment) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + PAIR_LEN * assignment.len());
    buf.put_u8(ASSIGNMENT_TAG);
    buf.put_u32(time);
    buf.put_u32(assignment.len() as u32);
    for (agent, target) in assignment.iter() {
        buf.put_u32(agent.raw());
        buf.put_u32(target.raw());
    }
    buf.freeze()
}

pub fn decode_assignment(mut frame: Bytes) -> anyhow::Result<(u32, Assignment)> {
    ensure!(frame.len() >= HEADER_LEN, "Frame too short: {} bytes", frame.len());
    let tag = frame.get_u8();
    if tag != ASSIGNMENT_TAG {
        bail!("Unexpected frame tag {tag:#04x}");
    }
    let time = frame.get_u32();
    let count = frame.get_u32() as usize;
    ensure!(
        frame.remaining() == count * PAIR_LEN,
        "Frame announces {count} pairs but carries {} bytes",
        frame.remaining()
    );

    let mut assignment = Assignment::new();
    for _ in 0..count {
        let agent = EntityId(frame.get_u32());
        let target = EntityId(frame.get_u32());
        ensure!(assignment.target(agent).is_none(), "Agent {agent} assigned twice");
        assignment.assign(agent, Some(target));
    }
    Ok((time, assignment))
}
