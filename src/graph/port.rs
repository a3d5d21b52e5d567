//! Port entities (§4.K): `{direction, owner, name, connection?}`. Output
//! ports carry the boxed message iterator that feeds whatever gets
//! connected downstream; the box moves to the input port's slot at
//! `connect` time, matching the pull model (only one reader ever exists).

use crate::message::Message;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Direction {
    In,
    Out,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PortId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ComponentId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConnectionId(pub usize);

/// A source of `Message`s pulled one at a time; `Again`/end-of-stream are
/// reported the same way every other iterator in this crate reports them
/// (`crate::error::Error::Again`, `Ok(None)`).
pub trait MessageIterator {
    fn next_message(&mut self) -> crate::error::Result<Option<Message>>;
}

pub(crate) struct Port {
    pub(crate) direction: Direction,
    pub(crate) owner: ComponentId,
    pub(crate) name: String,
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) iterator: Option<Box<dyn MessageIterator>>,
}

impl Port {
    pub(crate) fn new(direction: Direction, owner: ComponentId, name: impl Into<String>) -> Self {
        Port {
            direction,
            owner,
            name: name.into(),
            connection: None,
            iterator: None,
        }
    }
}
