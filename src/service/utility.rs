/// Liveness helpers.
#[derive(Clone, Copy, Debug, Default)]
pub struct UtilityService;

impl UtilityService {
    pub fn ping(&self) -> &'static str {
        "pong"
    }
}
