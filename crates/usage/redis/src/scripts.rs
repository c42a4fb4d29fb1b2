/// Append one usage record and bump the scope totals atomically.
///
/// `KEYS[1]` is the record list, `KEYS[2]` the totals hash.
/// `ARGV[1]` is the JSON-encoded record, `ARGV[2]` its row count.
pub const APPEND_RECORD: &str = r"
redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('HINCRBY', KEYS[2], 'row_count', ARGV[2])
redis.call('HINCRBY', KEYS[2], 'requests', 1)
return 1
";

/// Append one usage record only if the scope's row total stays within a
/// limit. Reads the running total and writes in one script, so no other
/// client can slip in between the check and the append.
///
/// `KEYS` as in [`APPEND_RECORD`]. `ARGV[1]` is the JSON-encoded record,
/// `ARGV[2]` its row count, `ARGV[3]` the limit.
/// Returns `{appended, total}` where `appended` is 1 or 0.
pub const APPEND_WITHIN_LIMIT: &str = r"
local used = tonumber(redis.call('HGET', KEYS[2], 'row_count') or '0')
local total = used + tonumber(ARGV[2])
if total > tonumber(ARGV[3]) then
  return {0, total}
end
redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('HINCRBY', KEYS[2], 'row_count', ARGV[2])
redis.call('HINCRBY', KEYS[2], 'requests', 1)
return {1, total}
";
