//! Minimal MAVLink 2 encoder for end-to-end tests.

#![allow(dead_code)]

const HEARTBEAT: (u32, u8) = (0, 50);
const SYS_STATUS: (u32, u8) = (1, 124);
const GLOBAL_POSITION_INT: (u32, u8) = (33, 104);
const STATUSTEXT: (u32, u8) = (253, 83);

fn x25(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in bytes {
        let mut tmp = byte ^ (crc & 0xFF) as u8;
        tmp ^= tmp << 4;
        let tmp = tmp as u16;
        crc = (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4);
    }
    crc
}

/// Encode one untruncated MAVLink 2 frame.
pub fn frame((msg_id, crc_extra): (u32, u8), seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFD, payload.len() as u8, 0, 0, seq, 1, 1];
    out.extend_from_slice(&msg_id.to_le_bytes()[..3]);
    out.extend_from_slice(payload);
    let mut body = out[1..].to_vec();
    body.push(crc_extra);
    out.extend_from_slice(&x25(&body).to_le_bytes());
    out
}

pub fn heartbeat(seq: u8, custom_mode: u32, base_mode: u8) -> Vec<u8> {
    let mut p = custom_mode.to_le_bytes().to_vec();
    p.extend_from_slice(&[2, 3, base_mode, 4, 3]);
    frame(HEARTBEAT, seq, &p)
}

pub fn global_position(
    seq: u8,
    lat: i32,
    lon: i32,
    alt: i32,
    relative_alt: i32,
    hdg: u16,
) -> Vec<u8> {
    let mut p = 0u32.to_le_bytes().to_vec();
    for v in [lat, lon, alt, relative_alt] {
        p.extend_from_slice(&v.to_le_bytes());
    }
    p.extend_from_slice(&[0; 6]);
    p.extend_from_slice(&hdg.to_le_bytes());
    frame(GLOBAL_POSITION_INT, seq, &p)
}

pub fn sys_status(seq: u8, voltage_mv: u16, current_ca: i16, remaining: i8) -> Vec<u8> {
    let mut p = vec![0u8; 31];
    p[14..16].copy_from_slice(&voltage_mv.to_le_bytes());
    p[16..18].copy_from_slice(&current_ca.to_le_bytes());
    p[30] = remaining as u8;
    frame(SYS_STATUS, seq, &p)
}

pub fn status_text(seq: u8, severity: u8, text: &str) -> Vec<u8> {
    let mut p = vec![0u8; 51];
    p[0] = severity;
    p[1..1 + text.len()].copy_from_slice(text.as_bytes());
    frame(STATUSTEXT, seq, &p)
}

/// Latitude offset in 1e-7 degrees for `meters` north on a 6 371 km sphere.
pub fn meters_north(meters: f64) -> i32 {
    (meters / 111_194.93 * 1e7).round() as i32
}
