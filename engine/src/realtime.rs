use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::server::Server;

impl Server {
    /// Drive the loop clock from wall-clock time.
    ///
    /// Drains the queue, then sleeps until the next timer deadline and
    /// advances the loop by the real time that passed. Returns once `done`
    /// holds after a drain, or when nothing is left to wait for.
    ///
    /// Loop state is consistent at every await point, so dropping the future
    /// (for example from `tokio::time::timeout`) is safe.
    pub async fn run_realtime<F>(&mut self, mut done: F)
    where
        F: FnMut(&Server) -> bool,
    {
        let origin = Instant::now();
        let base = self.time_since_init();

        loop {
            self.run_until_idle();
            if done(self) {
                return;
            }

            let Some(deadline) = self.event_loop().with(|event_loop| event_loop.next_deadline())
            else {
                debug!("No pending timers, leaving real-time loop");
                return;
            };

            let now = self.time_since_init();
            sleep(deadline.saturating_sub(now)).await;
            self.advance_to(base + origin.elapsed());
        }
    }
}
