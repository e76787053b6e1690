//! Raw event decoding.
//!
//! Remotes deliver an EV_MSC/MSC_SCAN carrying the vendor scan code followed
//! by the EV_KEY edge in the same hardware report. The decoder buffers the
//! most recent scan and consumes it when the next key edge arrives, so each
//! scan annotates at most one edge.

use std::collections::HashMap;

use tracing::trace;

use roomhub_core::Edge;

use super::RawEvent;

/// Stateful raw-to-logical decoder.
///
/// `mapping` keys are matched against, in order: the key code as decimal, the
/// buffered scan code as hex (`0x` prefixed, lowercase), and the buffered
/// scan code as decimal. Unmapped events decode to nothing.
pub struct Decoder {
    mapping: HashMap<String, String>,
    last_scan: Option<u32>,
}

impl Decoder {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self {
            mapping,
            last_scan: None,
        }
    }

    /// Feeds one raw event; returns a logical edge when one is decoded.
    pub fn feed(&mut self, raw: RawEvent) -> Option<(String, Edge)> {
        match raw {
            RawEvent::Scan(code) => {
                self.last_scan = Some(code);
                None
            }
            RawEvent::Key { value: 2, .. } => {
                // Hardware auto-repeat. Ignored without consuming the scan
                // context; the eventual release still pairs correctly.
                None
            }
            RawEvent::Key { code, value } => {
                let edge = match value {
                    1 => Edge::Down,
                    0 => Edge::Up,
                    other => {
                        trace!(code, value = other, "unrecognized key value");
                        return None;
                    }
                };
                let scan = self.last_scan.take();
                let button = self.resolve(code, scan)?;
                Some((button, edge))
            }
            RawEvent::Other => None,
        }
    }

    fn resolve(&self, code: u16, scan: Option<u32>) -> Option<String> {
        if let Some(name) = self.mapping.get(&code.to_string()) {
            return Some(name.clone());
        }
        if let Some(scan) = scan {
            if let Some(name) = self.mapping.get(&format!("{scan:#x}")) {
                return Some(name.clone());
            }
            if let Some(name) = self.mapping.get(&scan.to_string()) {
                return Some(name.clone());
            }
        }
        trace!(code, ?scan, "unmapped input event");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(entries: &[(&str, &str)]) -> Decoder {
        Decoder::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_keycode_decimal_takes_priority_over_scan() {
        let mut d = decoder(&[("116", "power"), ("0xc022d", "channel_up")]);

        d.feed(RawEvent::Scan(0xc022d));
        let decoded = d.feed(RawEvent::Key { code: 116, value: 1 });

        assert_eq!(decoded, Some(("power".to_string(), Edge::Down)));
    }

    #[test]
    fn test_scan_hex_fallback_when_keycode_unmapped() {
        let mut d = decoder(&[("0xc022d", "channel_up")]);

        d.feed(RawEvent::Scan(0xc022d));
        let down = d.feed(RawEvent::Key { code: 999, value: 1 });

        assert_eq!(down, Some(("channel_up".to_string(), Edge::Down)));
    }

    #[test]
    fn test_scan_decimal_fallback() {
        // 0xc022d == 786989
        let mut d = decoder(&[("786989", "channel_up")]);

        d.feed(RawEvent::Scan(0xc022d));
        let down = d.feed(RawEvent::Key { code: 999, value: 1 });

        assert_eq!(down, Some(("channel_up".to_string(), Edge::Down)));
    }

    #[test]
    fn test_scan_is_consumed_by_one_edge() {
        let mut d = decoder(&[("0x10", "a")]);

        d.feed(RawEvent::Scan(0x10));
        assert!(d.feed(RawEvent::Key { code: 999, value: 1 }).is_some());
        // Second edge with no fresh scan finds nothing to pair with.
        assert!(d.feed(RawEvent::Key { code: 999, value: 0 }).is_none());
    }

    #[test]
    fn test_autorepeat_does_not_consume_scan() {
        let mut d = decoder(&[("0x10", "a")]);

        d.feed(RawEvent::Scan(0x10));
        assert!(d.feed(RawEvent::Key { code: 999, value: 2 }).is_none());
        // The release after the repeat burst still resolves via the scan.
        assert_eq!(
            d.feed(RawEvent::Key { code: 999, value: 0 }),
            Some(("a".to_string(), Edge::Up))
        );
    }

    #[test]
    fn test_unmapped_event_decodes_to_nothing() {
        let mut d = decoder(&[("116", "power")]);

        assert!(d.feed(RawEvent::Key { code: 30, value: 1 }).is_none());
        assert!(d.feed(RawEvent::Other).is_none());
    }
}
