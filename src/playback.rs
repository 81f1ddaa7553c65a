use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameRate(u8);

impl FrameRate {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 30;

    pub fn new(fps: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&fps).then_some(Self(fps))
    }

    pub fn saturating(fps: u32) -> Self {
        Self(fps.clamp(u32::from(Self::MIN), u32::from(Self::MAX)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn interval(self) -> Duration {
        Duration::from_secs(1) / u32::from(self.0)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self(10)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticker {
    interval: Duration,
    next_due: Instant,
}

impl Ticker {
    fn start(now: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_due: now + interval,
        }
    }

    /// Number of whole intervals that elapsed, moving the deadline past them.
    fn fire(&mut self, now: Instant) -> usize {
        if now < self.next_due {
            return 0;
        }
        let overdue = now.duration_since(self.next_due);
        let fired = (overdue.as_nanos() / self.interval.as_nanos().max(1)) as usize + 1;
        self.next_due += self.interval * fired as u32;
        fired
    }
}

#[derive(Debug, Clone)]
pub struct CinePlayback {
    total_frames: usize,
    current: usize,
    playing: bool,
    frame_rate: FrameRate,
    ticker: Option<Ticker>,
}

impl CinePlayback {
    pub fn new(total_frames: usize, frame_rate: FrameRate) -> Self {
        Self {
            total_frames,
            current: 0,
            playing: false,
            frame_rate,
            ticker: None,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    #[cfg(test)]
    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn toggle_play_pause(&mut self, now: Instant) {
        self.playing = !self.playing;
        self.reschedule(now);
    }

    pub fn set_frame_rate(&mut self, frame_rate: FrameRate, now: Instant) {
        if frame_rate == self.frame_rate {
            return;
        }
        self.frame_rate = frame_rate;
        self.reschedule(now);
    }

    pub fn seek(&mut self, index: usize, now: Instant) {
        if self.total_frames == 0 {
            return;
        }
        self.current = index.min(self.total_frames - 1);
        self.reschedule(now);
    }

    pub fn step(&mut self, delta: i64, now: Instant) {
        if self.total_frames == 0 {
            return;
        }
        let total = self.total_frames as i64;
        let next = (self.current as i64 + delta).rem_euclid(total);
        self.seek(next as usize, now);
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(ticker) = self.ticker.as_mut() else {
            return false;
        };
        let fired = ticker.fire(now);
        if fired == 0 {
            return false;
        }
        self.current = (self.current + fired % self.total_frames) % self.total_frames;
        true
    }

    pub fn time_until_next_tick(&self, now: Instant) -> Option<Duration> {
        self.ticker
            .map(|ticker| ticker.next_due.saturating_duration_since(now))
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.ticker = None;
    }

    fn reschedule(&mut self, now: Instant) {
        self.ticker = if self.playing && self.total_frames > 1 {
            Some(Ticker::start(now, self.frame_rate.interval()))
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn frame_rate_rejects_out_of_range_values() {
        assert!(FrameRate::new(0).is_none());
        assert!(FrameRate::new(31).is_none());
        assert_eq!(FrameRate::new(30).map(FrameRate::get), Some(30));
        assert_eq!(FrameRate::saturating(0).get(), 1);
        assert_eq!(FrameRate::saturating(500).get(), 30);
        assert_eq!(FrameRate::default().get(), 10);
    }

    #[test]
    fn advances_one_frame_per_interval_for_every_rate() {
        for fps in FrameRate::MIN..=FrameRate::MAX {
            let rate = FrameRate::new(fps).expect("rate in range");
            let start = Instant::now();
            let mut playback = CinePlayback::new(7, rate);
            playback.toggle_play_pause(start);

            let interval = rate.interval();
            assert!(!playback.tick(start + interval - Duration::from_nanos(1)));
            assert_eq!(playback.current(), 0);
            for expected in 1..=9 {
                assert!(playback.tick(start + interval * expected as u32));
                assert_eq!(playback.current(), expected % 7, "fps={fps}");
            }
        }
    }

    #[test]
    fn wraps_from_last_frame_to_first() {
        let start = Instant::now();
        let rate = FrameRate::new(10).expect("rate in range");
        let mut playback = CinePlayback::new(10, rate);
        playback.seek(9, start);
        playback.toggle_play_pause(start);

        assert!(playback.tick(start + ms(100)));
        assert_eq!(playback.current(), 0);
    }

    #[test]
    fn late_tick_catches_up_by_whole_intervals() {
        let start = Instant::now();
        let mut playback = CinePlayback::new(100, FrameRate::default());
        playback.toggle_play_pause(start);

        assert!(playback.tick(start + ms(350)));
        assert_eq!(playback.current(), 3);
        assert_eq!(playback.time_until_next_tick(start + ms(350)), Some(ms(50)));
    }

    #[test]
    fn single_frame_never_schedules_a_ticker() {
        let start = Instant::now();
        let mut playback = CinePlayback::new(1, FrameRate::default());
        playback.toggle_play_pause(start);
        assert!(playback.is_playing());
        assert!(!playback.is_ticking());
        assert!(!playback.tick(start + Duration::from_secs(5)));
        assert_eq!(playback.current(), 0);
    }

    #[test]
    fn changing_rate_restarts_the_interval() {
        let start = Instant::now();
        let mut playback = CinePlayback::new(50, FrameRate::new(1).expect("rate"));
        playback.toggle_play_pause(start);

        let changed_at = start + ms(900);
        playback.set_frame_rate(FrameRate::new(10).expect("rate"), changed_at);
        assert!(!playback.tick(changed_at + ms(50)));
        assert!(playback.tick(changed_at + ms(100)));
        assert_eq!(playback.current(), 1);
    }

    #[test]
    fn pausing_cancels_the_ticker() {
        let start = Instant::now();
        let mut playback = CinePlayback::new(5, FrameRate::default());
        playback.toggle_play_pause(start);
        playback.toggle_play_pause(start + ms(50));

        assert!(!playback.is_ticking());
        assert!(!playback.tick(start + Duration::from_secs(3)));
        assert_eq!(playback.current(), 0);
        assert_eq!(playback.time_until_next_tick(start), None);
    }

    #[test]
    fn step_wraps_in_both_directions() {
        let now = Instant::now();
        let mut playback = CinePlayback::new(4, FrameRate::default());
        playback.step(-1, now);
        assert_eq!(playback.current(), 3);
        playback.step(2, now);
        assert_eq!(playback.current(), 1);
    }

    #[test]
    fn empty_sequence_ignores_navigation() {
        let now = Instant::now();
        let mut playback = CinePlayback::new(0, FrameRate::default());
        playback.toggle_play_pause(now);
        playback.step(1, now);
        playback.seek(3, now);
        assert!(!playback.is_ticking());
        assert_eq!(playback.current(), 0);
    }
}
