//! End-to-end tests over a real TCP connection

mod common;

use std::time::Duration;

use common::{array, bulk, bulk_text, int, simple, Client, TestServer};
use hematite::protocol::RespFrame;

#[test]
fn ping_pong() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);
    assert_eq!(client.query(&["PING"]), simple("PONG"));
}

#[test]
fn echo_round_trip() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);
    assert_eq!(client.query(&["ECHO", "hello"]), bulk("hello"));
}

#[test]
fn set_get_with_expiry() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["SET", "k", "v", "PX", "80"]), simple("OK"));
    assert_eq!(client.query(&["GET", "k"]), bulk("v"));

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(client.query(&["GET", "k"]), RespFrame::null_bulk());
}

#[test]
fn get_missing_key_is_null() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);
    assert_eq!(client.query(&["GET", "nothing"]), RespFrame::null_bulk());
}

#[test]
fn incr_semantics() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["INCR", "counter"]), int(1));
    assert_eq!(client.query(&["INCR", "counter"]), int(2));

    assert_eq!(client.query(&["SET", "text", "abc"]), simple("OK"));
    match client.query(&["INCR", "text"]) {
        RespFrame::Error(message) => {
            assert_eq!(
                String::from_utf8_lossy(&message),
                "ERR value is not an integer or out of range"
            );
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn list_round_trip() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["RPUSH", "k", "a", "b", "c"]), int(3));
    assert_eq!(
        client.query(&["LRANGE", "k", "0", "-1"]),
        array(vec![bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(
        client.query(&["LPOP", "k", "2"]),
        array(vec![bulk("a"), bulk("b")])
    );
    assert_eq!(client.query(&["LLEN", "k"]), int(1));
    assert_eq!(client.query(&["LPOP", "k"]), bulk("c"));
    assert_eq!(client.query(&["LPOP", "k"]), RespFrame::null_bulk());
}

#[test]
fn wrongtype_is_reported_and_nothing_mutates() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["RPUSH", "k", "a"]), int(1));
    match client.query(&["GET", "k"]) {
        RespFrame::Error(message) => {
            assert!(String::from_utf8_lossy(&message).starts_with("WRONGTYPE"));
        }
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(client.query(&["LLEN", "k"]), int(1));
}

#[test]
fn type_command() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.query(&["SET", "s", "v"]);
    client.query(&["RPUSH", "l", "a"]);
    client.query(&["XADD", "x", "1-1", "f", "v"]);
    client.query(&["ZADD", "z", "1", "m"]);

    assert_eq!(client.query(&["TYPE", "s"]), simple("string"));
    assert_eq!(client.query(&["TYPE", "l"]), simple("list"));
    assert_eq!(client.query(&["TYPE", "x"]), simple("stream"));
    assert_eq!(client.query(&["TYPE", "z"]), simple("zset"));
    assert_eq!(client.query(&["TYPE", "missing"]), simple("none"));
}

#[test]
fn blpop_wakes_on_push() {
    let server = TestServer::start();
    let mut blocked = Client::connect(server.port);
    let mut pusher = Client::connect(server.port);

    blocked.send(&["BLPOP", "queue", "0"]);
    // No reply while the list is empty
    assert!(blocked.try_read_frame(Duration::from_millis(150)).is_none());

    assert_eq!(pusher.query(&["RPUSH", "queue", "x"]), int(1));
    assert_eq!(
        blocked.read_frame(Duration::from_secs(2)),
        array(vec![bulk("queue"), bulk("x")])
    );
}

#[test]
fn blpop_times_out_with_null() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.send(&["BLPOP", "queue", "0.1"]);
    assert_eq!(
        client.read_frame(Duration::from_secs(2)),
        RespFrame::null_array()
    );
}

#[test]
fn blpop_serves_waiters_in_arrival_order() {
    let server = TestServer::start();
    let mut first = Client::connect(server.port);
    let mut second = Client::connect(server.port);
    let mut pusher = Client::connect(server.port);

    first.send(&["BLPOP", "queue", "0"]);
    std::thread::sleep(Duration::from_millis(100));
    second.send(&["BLPOP", "queue", "0"]);
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(pusher.query(&["RPUSH", "queue", "one", "two"]), int(2));

    assert_eq!(
        first.read_frame(Duration::from_secs(2)),
        array(vec![bulk("queue"), bulk("one")])
    );
    assert_eq!(
        second.read_frame(Duration::from_secs(2)),
        array(vec![bulk("queue"), bulk("two")])
    );
}

#[test]
fn xadd_auto_ids_and_xrange() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    let first = bulk_text(&client.query(&["XADD", "s", "*", "f1", "v1"]));
    let second = bulk_text(&client.query(&["XADD", "s", "*", "f2", "v2"]));
    assert!(first.contains('-'));
    assert!(second.contains('-'));
    assert_ne!(first, second);

    match client.query(&["XRANGE", "s", "-", "+"]) {
        RespFrame::Array(Some(entries)) => {
            assert_eq!(entries.len(), 2);
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn xadd_rejects_bad_ids() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    match client.query(&["XADD", "s", "0-0", "f", "v"]) {
        RespFrame::Error(message) => {
            assert_eq!(
                String::from_utf8_lossy(&message),
                "ERR The ID specified in XADD must be greater than 0-0"
            );
        }
        other => panic!("expected error, got {:?}", other),
    }

    client.query(&["XADD", "s", "5-5", "f", "v"]);
    match client.query(&["XADD", "s", "5-5", "f", "v"]) {
        RespFrame::Error(message) => {
            assert!(String::from_utf8_lossy(&message)
                .contains("equal or smaller than the target stream top item"));
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn xadd_partial_auto_sequence() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["XADD", "s", "7-*", "f", "v"]), bulk("7-0"));
    assert_eq!(client.query(&["XADD", "s", "7-*", "f", "v"]), bulk("7-1"));
    assert_eq!(client.query(&["XADD", "s", "8-*", "f", "v"]), bulk("8-0"));
}

#[test]
fn xrange_bare_timestamp_bounds() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.query(&["XADD", "s", "1-1", "f", "v"]);
    client.query(&["XADD", "s", "2-0", "f", "v"]);
    client.query(&["XADD", "s", "2-1", "f", "v"]);
    client.query(&["XADD", "s", "3-0", "f", "v"]);

    match client.query(&["XRANGE", "s", "2", "2"]) {
        RespFrame::Array(Some(entries)) => {
            assert_eq!(entries.len(), 2);
            match &entries[0] {
                RespFrame::Array(Some(parts)) => assert_eq!(parts[0], bulk("2-0")),
                other => panic!("unexpected entry: {:?}", other),
            }
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn xread_returns_strictly_newer_entries() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.query(&["XADD", "s", "1-1", "a", "1"]);
    client.query(&["XADD", "s", "1-2", "b", "2"]);

    match client.query(&["XREAD", "STREAMS", "s", "1-1"]) {
        RespFrame::Array(Some(streams)) => {
            assert_eq!(streams.len(), 1);
            match &streams[0] {
                RespFrame::Array(Some(parts)) => {
                    assert_eq!(parts[0], bulk("s"));
                    match &parts[1] {
                        RespFrame::Array(Some(entries)) => assert_eq!(entries.len(), 1),
                        other => panic!("unexpected entries: {:?}", other),
                    }
                }
                other => panic!("unexpected stream: {:?}", other),
            }
        }
        other => panic!("expected array, got {:?}", other),
    }

    // Nothing newer than the top entry
    assert_eq!(
        client.query(&["XREAD", "STREAMS", "s", "1-2"]),
        RespFrame::null_array()
    );
}

#[test]
fn xread_block_wakes_on_xadd() {
    let server = TestServer::start();
    let mut blocked = Client::connect(server.port);
    let mut producer = Client::connect(server.port);

    producer.query(&["XADD", "s", "1-1", "f", "old"]);

    blocked.send(&["XREAD", "BLOCK", "0", "STREAMS", "s", "$"]);
    assert!(blocked.try_read_frame(Duration::from_millis(150)).is_none());

    producer.query(&["XADD", "s", "2-1", "f", "new"]);

    match blocked.read_frame(Duration::from_secs(2)) {
        RespFrame::Array(Some(streams)) => assert_eq!(streams.len(), 1),
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn xread_block_times_out_with_null() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.send(&["XREAD", "BLOCK", "100", "STREAMS", "s", "$"]);
    assert_eq!(
        client.read_frame(Duration::from_secs(2)),
        RespFrame::null_array()
    );
}

#[test]
fn multi_exec_runs_queue_in_order() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["MULTI"]), simple("OK"));
    assert_eq!(client.query(&["SET", "a", "1"]), simple("QUEUED"));
    assert_eq!(client.query(&["INCR", "a"]), simple("QUEUED"));
    assert_eq!(
        client.query(&["EXEC"]),
        array(vec![simple("OK"), int(2)])
    );

    // The transaction is closed afterwards
    assert_eq!(client.query(&["GET", "a"]), bulk("2"));
}

#[test]
fn transaction_misuse_errors() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    match client.query(&["EXEC"]) {
        RespFrame::Error(message) => {
            assert_eq!(String::from_utf8_lossy(&message), "ERR EXEC without MULTI")
        }
        other => panic!("expected error, got {:?}", other),
    }
    match client.query(&["DISCARD"]) {
        RespFrame::Error(message) => {
            assert_eq!(String::from_utf8_lossy(&message), "ERR DISCARD without MULTI")
        }
        other => panic!("expected error, got {:?}", other),
    }

    assert_eq!(client.query(&["MULTI"]), simple("OK"));
    assert!(client.query(&["MULTI"]).is_error());
    assert_eq!(client.query(&["DISCARD"]), simple("OK"));
}

#[test]
fn discard_drops_queued_commands() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.query(&["MULTI"]);
    client.query(&["SET", "a", "1"]);
    client.query(&["DISCARD"]);
    assert_eq!(client.query(&["GET", "a"]), RespFrame::null_bulk());
}

#[test]
fn errors_inside_exec_do_not_abort_the_rest() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.query(&["SET", "text", "abc"]);
    client.query(&["MULTI"]);
    client.query(&["INCR", "text"]);
    client.query(&["SET", "after", "yes"]);

    match client.query(&["EXEC"]) {
        RespFrame::Array(Some(replies)) => {
            assert_eq!(replies.len(), 2);
            assert!(replies[0].is_error());
            assert_eq!(replies[1], simple("OK"));
        }
        other => panic!("expected array, got {:?}", other),
    }
    assert_eq!(client.query(&["GET", "after"]), bulk("yes"));
}

#[test]
fn sorted_set_commands() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["ZADD", "z", "2", "b"]), int(1));
    assert_eq!(client.query(&["ZADD", "z", "1", "a"]), int(1));
    assert_eq!(client.query(&["ZADD", "z", "3", "a"]), int(0));

    assert_eq!(client.query(&["ZCARD", "z"]), int(2));
    assert_eq!(client.query(&["ZRANK", "z", "b"]), int(0));
    assert_eq!(client.query(&["ZSCORE", "z", "a"]), bulk("3"));
    assert_eq!(
        client.query(&["ZRANGE", "z", "0", "-1"]),
        array(vec![bulk("b"), bulk("a")])
    );
    assert_eq!(client.query(&["ZREM", "z", "a"]), int(1));
    assert_eq!(client.query(&["ZREM", "z", "a"]), int(0));
    assert_eq!(client.query(&["ZRANK", "z", "missing"]), RespFrame::null_bulk());
}

#[test]
fn geo_commands() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(
        client.query(&["GEOADD", "Sicily", "13.361389", "38.115556", "Palermo"]),
        int(1)
    );
    assert_eq!(
        client.query(&["GEOADD", "Sicily", "15.087269", "37.502669", "Catania"]),
        int(1)
    );

    // Out-of-range coordinates are rejected
    match client.query(&["GEOADD", "Sicily", "200", "10", "Nowhere"]) {
        RespFrame::Error(message) => {
            assert!(String::from_utf8_lossy(&message)
                .starts_with("ERR invalid longitude,latitude pair"));
        }
        other => panic!("expected error, got {:?}", other),
    }

    // Palermo <-> Catania is about 166 km
    let distance = bulk_text(&client.query(&["GEODIST", "Sicily", "Palermo", "Catania"]))
        .parse::<f64>()
        .unwrap();
    assert!((distance - 166_274.0).abs() < 500.0, "distance was {}", distance);

    // GEOPOS returns the grid-cell centre, close to the input
    match client.query(&["GEOPOS", "Sicily", "Palermo", "Nowhere"]) {
        RespFrame::Array(Some(positions)) => {
            assert_eq!(positions.len(), 2);
            match &positions[0] {
                RespFrame::Array(Some(pair)) => {
                    let lon: f64 = bulk_text(&pair[0]).parse().unwrap();
                    let lat: f64 = bulk_text(&pair[1]).parse().unwrap();
                    assert!((lon - 13.361389).abs() < 0.001);
                    assert!((lat - 38.115556).abs() < 0.001);
                }
                other => panic!("unexpected position: {:?}", other),
            }
            assert_eq!(positions[1], RespFrame::null_array());
        }
        other => panic!("expected array, got {:?}", other),
    }

    match client.query(&[
        "GEOSEARCH", "Sicily", "FROMLONLAT", "15", "37", "BYRADIUS", "100000", "m",
    ]) {
        RespFrame::Array(Some(members)) => {
            assert_eq!(members, vec![bulk("Catania")]);
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn keys_and_del() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.query(&["SET", "a", "1"]);
    client.query(&["SET", "b", "2"]);

    match client.query(&["KEYS", "*"]) {
        RespFrame::Array(Some(keys)) => assert_eq!(keys.len(), 2),
        other => panic!("expected array, got {:?}", other),
    }

    assert_eq!(client.query(&["DEL", "a", "missing"]), int(1));
    assert_eq!(client.query(&["GET", "a"]), RespFrame::null_bulk());
}

#[test]
fn config_get_reports_startup_values() {
    let server = TestServer::start_with(|config| {
        config.dir = "/tmp/hematite-test".to_string();
        config.dbfilename = "snap.rdb".to_string();
    });
    let mut client = Client::connect(server.port);

    assert_eq!(
        client.query(&["CONFIG", "GET", "dir"]),
        array(vec![bulk("dir"), bulk("/tmp/hematite-test")])
    );
    assert_eq!(
        client.query(&["CONFIG", "GET", "dbfilename"]),
        array(vec![bulk("dbfilename"), bulk("snap.rdb")])
    );
}

#[test]
fn pubsub_delivery_and_mode_restriction() {
    let server = TestServer::start();
    let mut subscriber = Client::connect(server.port);
    let mut publisher = Client::connect(server.port);

    assert_eq!(
        subscriber.query(&["SUBSCRIBE", "news"]),
        array(vec![bulk("subscribe"), bulk("news"), int(1)])
    );

    // Only subscription commands and PING are allowed now
    match subscriber.query(&["GET", "k"]) {
        RespFrame::Error(message) => {
            assert!(String::from_utf8_lossy(&message).starts_with("ERR Can't execute 'get'"));
        }
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(subscriber.query(&["PING"]), simple("PONG"));

    assert_eq!(publisher.query(&["PUBLISH", "news", "hello"]), int(1));
    assert_eq!(
        subscriber.read_frame(Duration::from_secs(2)),
        array(vec![bulk("message"), bulk("news"), bulk("hello")])
    );

    // Unsubscribing the last channel returns the connection to normal mode
    assert_eq!(
        subscriber.query(&["UNSUBSCRIBE", "news"]),
        array(vec![bulk("unsubscribe"), bulk("news"), int(0)])
    );
    assert_eq!(subscriber.query(&["GET", "k"]), RespFrame::null_bulk());

    // Nobody is listening any more
    assert_eq!(publisher.query(&["PUBLISH", "news", "again"]), int(0));
}

#[test]
fn auth_and_acl() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["ACL", "WHOAMI"]), bulk("default"));
    // The built-in user starts with nopass
    assert_eq!(client.query(&["AUTH", "default", "anything"]), simple("OK"));

    assert_eq!(client.query(&["ACL", "SETUSER", "default", ">sekrit"]), simple("OK"));
    assert_eq!(client.query(&["AUTH", "default", "sekrit"]), simple("OK"));
    match client.query(&["AUTH", "default", "wrong"]) {
        RespFrame::Error(message) => {
            assert!(String::from_utf8_lossy(&message).starts_with("WRONGPASS"));
        }
        other => panic!("expected error, got {:?}", other),
    }

    match client.query(&["ACL", "GETUSER", "default"]) {
        RespFrame::Array(Some(parts)) => assert_eq!(parts[0], bulk("flags")),
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn unknown_command_is_an_error() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);
    assert!(client.query(&["FROBNICATE", "x"]).is_error());
}

#[test]
fn pipelined_commands_are_answered_in_order() {
    let server = TestServer::start();
    let mut client = Client::connect(server.port);

    client.send_raw(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n*1\r\n$4\r\nPING\r\n");
    assert_eq!(client.read_frame(Duration::from_secs(2)), simple("PONG"));
    assert_eq!(client.read_frame(Duration::from_secs(2)), bulk("hi"));
    assert_eq!(client.read_frame(Duration::from_secs(2)), simple("PONG"));
}

#[test]
fn loads_rdb_snapshot_at_startup() {
    let dir = tempfile::tempdir().unwrap();

    // Minimal RDB image: header, one plain entry, one entry with a far
    // future expiry, EOF
    let mut image = b"REDIS0011".to_vec();
    image.extend_from_slice(&[0x00, 3]);
    image.extend_from_slice(b"foo");
    image.push(3);
    image.extend_from_slice(b"bar");
    image.push(0xFC);
    let far_future = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64)
        + 60_000;
    image.extend_from_slice(&far_future.to_le_bytes());
    image.extend_from_slice(&[0x00, 3]);
    image.extend_from_slice(b"ttl");
    image.push(3);
    image.extend_from_slice(b"yes");
    image.push(0xFF);
    image.extend_from_slice(&[0u8; 8]);

    std::fs::write(dir.path().join("dump.rdb"), &image).unwrap();

    let dir_string = dir.path().to_str().unwrap().to_string();
    let server = TestServer::start_with(move |config| {
        config.dir = dir_string;
        config.dbfilename = "dump.rdb".to_string();
    });
    let mut client = Client::connect(server.port);

    assert_eq!(client.query(&["GET", "foo"]), bulk("bar"));
    assert_eq!(client.query(&["GET", "ttl"]), bulk("yes"));
}
