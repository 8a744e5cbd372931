#![cfg_attr(not(test), no_std)]

//! The opaque service registry: every concrete service type upcasts
//! into one [`Service`] enum so a node aggregate can hold a
//! fixed-capacity, heterogeneous set of them without `dyn`.

use openlcb_can::dispatch::openlcb_main::{HandlerOutcome, InboundMessage, MessageCategory, OpenLcbHandler};
use openlcb_can::node::VirtualNode;
use openlcb_can::storage::DefaultBufferStore;

pub enum Service {
    Minimum(openlcb_svc_minimum::MinimumNodeService),
}

/// A conversion trait for node services.
pub trait AnyService {
    fn upcast(self) -> Service;
    fn downcast<'c>(service: &'c Service) -> Option<&'c Self>
    where
        Self: Sized;
    fn downcast_mut<'c>(service: &'c mut Service) -> Option<&'c mut Self>
    where
        Self: Sized;
}

macro_rules! from_service {
    ($service:ty, $variant:ident) => {
        impl AnyService for $service {
            fn upcast(self) -> Service {
                Service::$variant(self)
            }

            fn downcast<'c>(socket: &'c Service) -> Option<&'c Self> {
                #[allow(unreachable_patterns)]
                match socket {
                    Service::$variant(socket) => Some(socket),
                    _ => None,
                }
            }

            fn downcast_mut<'c>(socket: &'c mut Service) -> Option<&'c mut Self> {
                #[allow(unreachable_patterns)]
                match socket {
                    Service::$variant(socket) => Some(socket),
                    _ => None,
                }
            }
        }
    };
}

from_service!(openlcb_svc_minimum::MinimumNodeService, Minimum);

impl<const MP: usize, const MC: usize> OpenLcbHandler<MP, MC> for Service {
    fn handle(
        &mut self,
        node: &mut VirtualNode<MP, MC>,
        category: MessageCategory,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> HandlerOutcome {
        match self {
            Service::Minimum(svc) => svc.handle(node, category, msg, store),
        }
    }
}
