//! The default benchmark suite and custom-command construction.

use crate::resp;

/// One benchmark to run: a display title plus the pre-encoded request.
pub struct Benchmark {
    pub title: String,
    pub request: Vec<u8>,
}

const RAND_KEY: &str = "key:rand:000000000000";
const RAND_COUNTER: &str = "counter:rand:000000000000";
const RAND_ELEMENT: &str = "element:rand:000000000000";

/// Benchmark a user-supplied command verbatim.
pub fn custom(argv: &[String]) -> Benchmark {
    Benchmark {
        title: argv.join(" "),
        request: resp::format_command(argv),
    }
}

/// The standard suite, covering the common key/value access patterns with a
/// payload of `payload_size` bytes where a value is written.
pub fn default_suite(payload_size: usize) -> Vec<Benchmark> {
    let data = "x".repeat(payload_size);
    let mut suite = vec![Benchmark {
        title: "PING (inline)".to_owned(),
        request: b"PING\r\n".to_vec(),
    }];

    let mut bench = |title: &str, argv: &[&str]| {
        suite.push(Benchmark {
            title: title.to_owned(),
            request: resp::format_command(argv),
        });
    };

    bench("PING", &["PING"]);

    let mut mset = vec!["MSET"];
    for _ in 0..10 {
        mset.push(RAND_KEY);
        mset.push(&data);
    }
    bench("MSET (10 keys)", &mset);

    bench("SET", &["SET", RAND_KEY, &data]);
    bench("GET", &["GET", RAND_KEY]);
    bench("INCR", &["INCR", RAND_COUNTER]);
    bench("LPUSH", &["LPUSH", "mylist", &data]);
    bench("LPOP", &["LPOP", "mylist"]);
    bench("SADD", &["SADD", "myset", RAND_ELEMENT]);
    bench("SPOP", &["SPOP", "myset"]);
    bench("LPUSH (needed to benchmark LRANGE)", &["LPUSH", "mylist", &data]);
    bench("LRANGE_100 (first 100 elements)", &["LRANGE", "mylist", "0", "99"]);
    bench("LRANGE_300 (first 300 elements)", &["LRANGE", "mylist", "0", "299"]);
    bench("LRANGE_450 (first 450 elements)", &["LRANGE", "mylist", "0", "449"]);
    bench("LRANGE_600 (first 600 elements)", &["LRANGE", "mylist", "0", "599"]);

    suite
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_requests_are_encoded() {
        let suite = default_suite(3);
        assert_eq!(suite[0].request, b"PING\r\n");
        for bench in &suite[1..] {
            assert_eq!(bench.request[0], b'*', "{} is not multi-bulk", bench.title);
        }
    }

    #[test]
    fn payload_size_is_honored() {
        let suite = default_suite(7);
        let set = suite.iter().find(|b| b.title == "SET").expect("SET entry");
        assert!(
            set.request
                .windows(9)
                .any(|w| w == b"$7\r\nxxxxx"),
            "payload bulk missing"
        );
    }

    #[test]
    fn randomized_keys_are_discoverable() {
        let suite = default_suite(3);
        let mset = suite
            .iter()
            .find(|b| b.title.starts_with("MSET"))
            .expect("MSET entry");
        assert_eq!(resp::rand_offsets(&mset.request).len(), 10);

        let get = suite.iter().find(|b| b.title == "GET").expect("GET entry");
        assert_eq!(resp::rand_offsets(&get.request).len(), 1);

        let lpop = suite.iter().find(|b| b.title == "LPOP").expect("LPOP entry");
        assert!(resp::rand_offsets(&lpop.request).is_empty());
    }

    #[test]
    fn custom_commands_take_the_joined_title() {
        let bench = custom(&["GET".to_owned(), "somekey".to_owned()]);
        assert_eq!(bench.title, "GET somekey");
        assert_eq!(bench.request, resp::format_command(&["GET", "somekey"]));
    }
}
