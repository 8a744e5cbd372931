use managed::ManagedSlice;
use openlcb_can::dispatch::openlcb_main::{HandlerOutcome, InboundMessage, MessageCategory, OpenLcbHandler};
use openlcb_can::node::VirtualNode;
use openlcb_can::storage::DefaultBufferStore;
use openlcb_svc_all::{AnyService, Service};

/// Opaque storage slot for one service.
///
/// Public so callers can allocate space for a fixed-size `ServiceSet`
/// (an array of these) without reaching into this crate's internals.
#[derive(Default)]
pub struct ServiceStorage {
    inner: Option<Item>,
}

impl ServiceStorage {
    pub const EMPTY: Self = Self { inner: None };
}

pub(crate) struct Item {
    service: Service,
}

/// A fixed- or growable-capacity set of registered services.
///
/// The lifetime `'a` is the borrow of the backing slice; pass an owned
/// `Vec` (under the `alloc` feature) for `ServiceSet<'static>`.
pub struct ServiceSet<'a> {
    services: ManagedSlice<'a, ServiceStorage>,
}

impl<'a> ServiceSet<'a> {
    pub fn new<ServicesT>(storage: ServicesT) -> ServiceSet<'a>
    where
        ServicesT: Into<ManagedSlice<'a, ServiceStorage>>,
    {
        ServiceSet { services: storage.into() }
    }

    /// Register a service, returning its slot.
    ///
    /// # Panics
    /// Panics if the backing storage is fixed-size and already full.
    pub fn add<T: AnyService>(&mut self, service: T) {
        fn put(slot: &mut ServiceStorage, service: Service) {
            *slot = ServiceStorage { inner: Some(Item { service }) };
        }

        let service = service.upcast();

        for slot in self.services.iter_mut() {
            if slot.inner.is_none() {
                return put(slot, service);
            }
        }

        match &mut self.services {
            ManagedSlice::Borrowed(_) => panic!("adding a service to a full ServiceSet"),
            #[cfg(feature = "alloc")]
            ManagedSlice::Owned(storage) => {
                storage.push(ServiceStorage { inner: None });
                let index = storage.len() - 1;
                put(&mut storage[index], service)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.items().map(|i| &i.service)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Service> {
        self.items_mut().map(|i| &mut i.service)
    }

    fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.services.iter().filter_map(|x| x.inner.as_ref())
    }

    fn items_mut(&mut self) -> impl Iterator<Item = &mut Item> + '_ {
        self.services.iter_mut().filter_map(|x| x.inner.as_mut())
    }
}

/// Fans an inbound message out to every registered service in
/// registration order, stopping at the first one that produces
/// anything other than "nothing to reply" (`Done(None)`).
///
/// A service that has no opinion on a category returns `Done(None)`,
/// indistinguishable here from "interested but nothing to send this
/// tick" — acceptable since no two registered services currently claim
/// the same category; see `DESIGN.md`.
impl<'a, const MP: usize, const MC: usize> OpenLcbHandler<MP, MC> for ServiceSet<'a> {
    fn handle(
        &mut self,
        node: &mut VirtualNode<MP, MC>,
        category: MessageCategory,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> HandlerOutcome {
        for service in self.iter_mut() {
            match service.handle(node, category, msg, store) {
                HandlerOutcome::Done(None) => continue,
                other => return other,
            }
        }
        HandlerOutcome::Done(None)
    }
}
