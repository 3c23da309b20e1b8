// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Server-side scripts that must run atomically against the KVS (spec §4.C).
//! Kept as plain source strings so both the `redis` backend and the
//! in-memory test double can be checked against the same contract; the
//! in-memory backend implements the same semantics directly in Rust rather
//! than through an embedded Lua interpreter.

/// Deletes `KEYS[1]` iff its current value equals `ARGV[1]`.
/// Returns 1 if deleted, 0 otherwise.
///
/// Used to release `connected_node(clientId)` only when it still points at
/// the node performing the disconnect, so a stale disconnect can never
/// clobber a newer connection that has already rebound to another node.
pub const CHECKDEL: &str = r"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
";

/// Increments `KEYS[1]` by one and, if the post-increment value exceeds
/// `ARGV[1]` (the limit), resets it to 1. Returns the resulting value.
///
/// Used as the packet-id allocator with `limit = 65535`; MQTT reserves
/// packet id 0, so wrapping lands on 1, never 0.
pub const INCRLIMIT: &str = r"
local value = redis.call('INCR', KEYS[1])
if value > tonumber(ARGV[1]) then
    redis.call('SET', KEYS[1], 1)
    return 1
end
return value
";
