//! Event and EventStream - upstream producer input
//!
//! An event is a (time, record) pair; a stream is an ordered, restartable
//! sequence of events.

use serde_json::{Map, Value};

use crate::EventTime;

/// Structured record: field name -> value
pub type Record = Map<String, Value>;

/// Single timestamped record
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: EventTime,
    pub record: Record,
}

impl Event {
    pub fn new(time: EventTime, record: Record) -> Self {
        Self { time, record }
    }
}

/// Internal storage shapes; all are iterated identically.
#[derive(Debug, Clone, PartialEq)]
enum Repr {
    One(Event),
    Array(Vec<Event>),
    /// Paired arrays, `times.len() == records.len()`
    Multi {
        times: Vec<EventTime>,
        records: Vec<Record>,
    },
}

/// Ordered event sequence
///
/// Duplicates are legal; events carry no identity beyond their position.
/// Iteration borrows, so the stream can be traversed any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    repr: Repr,
}

impl EventStream {
    /// Empty multi-event stream
    pub fn new() -> Self {
        Self {
            repr: Repr::Multi {
                times: Vec::new(),
                records: Vec::new(),
            },
        }
    }

    /// Multi-event stream with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            repr: Repr::Multi {
                times: Vec::with_capacity(capacity),
                records: Vec::with_capacity(capacity),
            },
        }
    }

    /// Stream holding exactly one event
    pub fn one(time: EventTime, record: Record) -> Self {
        Self {
            repr: Repr::One(Event::new(time, record)),
        }
    }

    /// Stream over an existing event array
    pub fn from_events(events: Vec<Event>) -> Self {
        Self {
            repr: Repr::Array(events),
        }
    }

    /// Append an event
    pub fn add(&mut self, time: EventTime, record: Record) {
        match &mut self.repr {
            Repr::Multi { times, records } => {
                times.push(time);
                records.push(record);
            }
            Repr::Array(events) => events.push(Event::new(time, record)),
            Repr::One(_) => {
                let Repr::One(first) = std::mem::replace(&mut self.repr, Repr::Array(Vec::new()))
                else {
                    unreachable!()
                };
                self.repr = Repr::Array(vec![first, Event::new(time, record)]);
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::One(_) => 1,
            Repr::Array(events) => events.len(),
            Repr::Multi { times, .. } => times.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate events in order
    pub fn iter(&self) -> EventIter<'_> {
        let inner = match &self.repr {
            Repr::One(event) => IterRepr::One(Some(event)),
            Repr::Array(events) => IterRepr::Array(events.iter()),
            Repr::Multi { times, records } => IterRepr::Multi(times.iter().zip(records.iter())),
        };
        EventIter { inner }
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Event> for EventStream {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::from_events(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = (EventTime, &'a Record);
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum IterRepr<'a> {
    One(Option<&'a Event>),
    Array(std::slice::Iter<'a, Event>),
    Multi(std::iter::Zip<std::slice::Iter<'a, EventTime>, std::slice::Iter<'a, Record>>),
}

/// Borrowing iterator over `(time, record)` pairs
pub struct EventIter<'a> {
    inner: IterRepr<'a>,
}

impl<'a> Iterator for EventIter<'a> {
    type Item = (EventTime, &'a Record);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterRepr::One(slot) => slot.take().map(|e| (e.time, &e.record)),
            IterRepr::Array(iter) => iter.next().map(|e| (e.time, &e.record)),
            IterRepr::Multi(iter) => iter.next().map(|(t, r)| (*t, r)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            IterRepr::One(slot) => {
                let n = usize::from(slot.is_some());
                (n, Some(n))
            }
            IterRepr::Array(iter) => iter.size_hint(),
            IterRepr::Multi(iter) => iter.size_hint(),
        }
    }
}
