use openlcb_defs::ServiceType;

pub trait OpenLcbService {
    /// Runs the service initialization
    fn init() {}

    /// Returns the service ID
    ///
    /// By default it returns [`ServiceType::None`] which means that the
    /// service should not communicate.
    fn service_id() -> ServiceType {
        ServiceType::None
    }

    /// Returns the service version
    fn service_version() -> u8 {
        0
    }
}
