use std::collections::BTreeMap;

use crate::stream::Stream;

/// Output channels of one producer, keyed by channel name.
pub type ChannelSet<T> = BTreeMap<String, Stream<T>>;

/// Merge the channel sets of several producers channel by channel.
///
/// Producers are visited in the order given; a channel declared by a single
/// producer is passed through as is, and `ignored` names never reach the
/// result.
pub fn merge_channels<T: Clone + 'static>(
    producers: &[&ChannelSet<T>],
    ignored: &[&str],
) -> ChannelSet<T> {
    let mut declared: BTreeMap<&str, Vec<Stream<T>>> = BTreeMap::new();
    for producer in producers {
        for (name, stream) in producer.iter() {
            if ignored.contains(&name.as_str()) {
                continue;
            }
            declared.entry(name.as_str()).or_default().push(stream.clone());
        }
    }

    declared
        .into_iter()
        .map(|(name, mut streams)| {
            let merged = if streams.len() == 1 {
                streams.remove(0)
            } else {
                Stream::merge(streams)
            };
            (name.to_string(), merged)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn set(entries: &[(&str, &Stream<u32>)]) -> ChannelSet<u32> {
        entries
            .iter()
            .map(|(name, stream)| (name.to_string(), (*stream).clone()))
            .collect()
    }

    #[test]
    fn single_producer_passes_through() {
        let log = Stream::new();
        let stack = set(&[("log", &log)]);
        let merged = merge_channels(&[&stack, &ChannelSet::new()], &[]);
        assert!(merged["log"].ptr_eq(&log));
    }

    #[test]
    fn every_event_appears_exactly_once() {
        let a = Stream::new();
        let b = Stream::new();
        let c = Stream::new();
        let stack = set(&[("http", &a)]);
        let frame = set(&[("http", &b)]);
        let global = set(&[("http", &c), ("screen", &c)]);
        let merged = merge_channels(&[&stack, &frame, &global], &["screen"]);
        assert!(!merged.contains_key("screen"));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = merged["http"].subscribe(move |v| sink.borrow_mut().push(*v));
        a.emit(1);
        c.emit(3);
        b.emit(2);
        a.emit(4);
        assert_eq!(*seen.borrow(), vec![1, 3, 2, 4]);
    }

    #[test]
    fn undeclared_channels_are_absent() {
        let merged: ChannelSet<u32> = merge_channels(&[&ChannelSet::new()], &[]);
        assert!(merged.is_empty());
    }
}
