
use crate::{ServerDescriptor, ServerId};

pub(crate) fn server_id(value: &str) -> ServerId {
    ServerId::new(value).unwrap()
}

pub(crate) fn descriptor(id: &str, command: &str) -> ServerDescriptor {
    ServerDescriptor::new(server_id(id), format!("{id} server"), command)
}
