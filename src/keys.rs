// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Deterministic KVS key schema. Every key here is a pure function of its
//! arguments so that any broker node computes the identical key for the
//! same logical entity (spec §4.B).

use crate::topic::join;

#[must_use]
pub fn connected_clients(node: &str) -> String {
    format!("connected_clients:{node}")
}

#[must_use]
pub fn connected_node(client_id: &str) -> String {
    format!("connected_node:{client_id}")
}

#[must_use]
pub fn session(client_id: &str) -> String {
    format!("session:{client_id}")
}

#[must_use]
pub fn next_packet_id(client_id: &str) -> String {
    format!("next_packet_id:{client_id}")
}

#[must_use]
pub fn qos2_set(client_id: &str) -> String {
    format!("qos2_set:{client_id}")
}

#[must_use]
pub fn in_flight_list(client_id: &str) -> String {
    format!("in_flight_list:{client_id}")
}

#[must_use]
pub fn in_flight_msg(client_id: &str, packet_id: u16) -> String {
    format!("in_flight_msg:{client_id}:{packet_id}")
}

#[must_use]
pub fn subscription(client_id: &str) -> String {
    format!("subscription:{client_id}")
}

/// Key for `topic_name(levels)`. Levels are joined with `/` after
/// sanitization, so `a/b` and `a//b` never collide (the empty middle level
/// is itself a level, preserved by `split`/`join`).
#[must_use]
pub fn topic_name(levels: &[String]) -> String {
    format!("topic_name:{}", join(levels))
}

#[must_use]
pub fn topic_filter(levels: &[String]) -> String {
    format!("topic_filter:{}", join(levels))
}

#[must_use]
pub fn topic_filter_child(prefix: &[String]) -> String {
    format!("topic_filter_child:{}", join(prefix))
}

#[must_use]
pub fn topic_retain_list(levels: &[String]) -> String {
    format!("topic_retain_list:{}", join(levels))
}

#[must_use]
pub fn topic_retain_msg(levels: &[String], packet_id: u16) -> String {
    format!("topic_retain_msg:{}:{packet_id}", join(levels))
}
