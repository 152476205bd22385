use std::time::SystemTime;

pub trait SystemTimeExt {
    /// Seconds relative to the unix epoch with nanosecond precision, e.g. `1700000000.000000042`.
    fn to_unix_timestamp(&self) -> String;
}

impl SystemTimeExt for SystemTime {
    fn to_unix_timestamp(&self) -> String {
        match self.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => format!("{}.{:09}", d.as_secs(), d.subsec_nanos()),
            Err(before_epoch) => {
                let d = before_epoch.duration();
                format!("-{}.{:09}", d.as_secs(), d.subsec_nanos())
            }
        }
    }
}
