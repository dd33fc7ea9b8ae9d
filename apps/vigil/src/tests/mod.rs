mod live_sync_test;
mod protocol_test;
mod throttle_test;
mod util;
