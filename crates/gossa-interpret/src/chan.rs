//! Channels and the goroutine scheduler.
//!
//! Goroutines are OS threads. All channel state changes happen under the one
//! scheduler lock (the [`Hub`]); a channel's own mutex is only ever taken
//! after it. Blocked goroutines wait on a single condition variable and are
//! all woken by every state change, after which they recheck their operation.
//!
//! On an unbuffered channel a blocked operation parks a waiter entry. The
//! partner that pairs with it finishes the parked operation on the spot, in
//! the same critical section, so an offered send is never left for a
//! receiver that went on to take another case.
//!
//! Deadlock detection counts the goroutines that found nothing to do since
//! the last state change. When that count covers every live goroutine the
//! run is aborted with exit status 2.

use crate::error::{panic_with, Flow, Unwind};
use crate::value::{zero, Value};
use gossa_core::error::Error;
use gossa_core::ssa::SelectDir;
use gossa_core::types::Type;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const DEADLOCK_MESSAGE: &str = "fatal error: all goroutines are asleep - deadlock!";

#[derive(Default)]
struct ChanState {
    buf: VecDeque<Value>,
    closed: bool,
    /// Goroutines parked receiving on an unbuffered channel: waiter and
    /// case index.
    recv_waiters: VecDeque<(u64, usize)>,
    /// Parked unbuffered sends with the value they offer.
    send_waiters: VecDeque<(u64, usize, Value)>,
}

pub struct Channel {
    pub id: u64,
    pub cap: usize,
    pub elem: Type,
    state: Mutex<ChanState>,
}

impl Channel {
    /// Number of buffered elements.
    pub fn len(&self) -> usize {
        self.state.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn recv_ready(state: &ChanState, hub: &Hub) -> bool {
        !state.buf.is_empty() || state.closed || state.send_waiters.iter().any(|(w, ..)| hub.is_parked(*w))
    }

    fn send_ready(&self, state: &ChanState, hub: &Hub) -> bool {
        state.closed
            || if self.cap > 0 {
                state.buf.len() < self.cap
            } else {
                state.recv_waiters.iter().any(|(w, _)| hub.is_parked(*w))
            }
    }

    /// Takes a value if one is available, finishing a parked sender.
    fn try_recv(&self, state: &mut ChanState, hub: &mut Hub) -> Option<(Value, bool)> {
        if let Some(v) = state.buf.pop_front() {
            return Some((v, true));
        }
        while let Some((waiter, case, v)) = state.send_waiters.pop_front() {
            if hub.is_parked(waiter) {
                hub.complete(waiter, case, None);
                return Some((v, true));
            }
        }
        if state.closed {
            return Some((zero(&self.elem), false));
        }
        None
    }

    /// Gives `value` to a parked receiver of an unbuffered channel; hands
    /// the value back when no receiver is waiting.
    fn hand_off(&self, state: &mut ChanState, hub: &mut Hub, value: Value) -> Result<(), Value> {
        while let Some((waiter, case)) = state.recv_waiters.pop_front() {
            if hub.is_parked(waiter) {
                hub.complete(waiter, case, Some(value));
                return Ok(());
            }
        }
        Err(value)
    }

    fn unpark(&self, waiter: u64) {
        let mut state = self.state.lock();
        state.recv_waiters.retain(|(w, _)| *w != waiter);
        state.send_waiters.retain(|(w, ..)| *w != waiter);
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chan#{}({}, cap {})", self.id, self.elem, self.cap)
    }
}

/// How a parked operation was finished by its partner goroutine.
#[derive(Debug)]
struct Completion {
    case: usize,
    /// The value handed to a parked receiver.
    value: Option<Value>,
}

#[derive(Debug, Default)]
struct Hub {
    live: usize,
    blocked: usize,
    epoch: u64,
    abort: Option<i32>,
    deadlocked: bool,
    next_waiter: u64,
    completions: HashMap<u64, Completion>,
}

impl Hub {
    fn next_waiter(&mut self) -> u64 {
        self.next_waiter += 1;
        self.next_waiter
    }

    /// Whether `waiter` is still parked, not yet finished by a partner.
    fn is_parked(&self, waiter: u64) -> bool {
        !self.completions.contains_key(&waiter)
    }

    fn complete(&mut self, waiter: u64, case: usize, value: Option<Value>) {
        self.completions.insert(waiter, Completion { case, value });
    }
}

/// One arm of a `select`, with its channel and send value evaluated.
pub struct SelectCase {
    pub dir: SelectDir,
    pub chan: Option<Arc<Channel>>,
    pub send: Option<Value>,
}

pub struct Scheduler {
    hub: Mutex<Hub>,
    cond: Condvar,
    aborted: AtomicBool,
    next_chan: AtomicU64,
    seed: AtomicU64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            hub: Mutex::new(Hub {
                live: 1,
                ..Hub::default()
            }),
            cond: Condvar::new(),
            aborted: AtomicBool::new(false),
            next_chan: AtomicU64::new(1),
            seed: AtomicU64::new(0x9E37_79B9_7F4A_7C15),
        }
    }

    pub fn make_chan(&self, elem: Type, cap: usize) -> Arc<Channel> {
        Arc::new(Channel {
            id: self.next_chan.fetch_add(1, Ordering::Relaxed),
            cap,
            elem,
            state: Mutex::new(ChanState::default()),
        })
    }

    pub fn live(&self) -> usize {
        self.hub.lock().live
    }

    pub fn spawned(&self) {
        self.hub.lock().live += 1;
    }

    /// A goroutine finished; the remaining ones may now all be blocked.
    pub fn exited(&self) {
        let mut hub = self.hub.lock();
        hub.live = hub.live.saturating_sub(1);
        if hub.live > 0 && hub.blocked >= hub.live && hub.abort.is_none() {
            self.declare_deadlock(&mut hub);
        }
    }

    /// Exit status the run was aborted with, if any.
    pub fn aborted(&self) -> Option<i32> {
        if !self.aborted.load(Ordering::Acquire) {
            return None;
        }
        self.hub.lock().abort
    }

    pub fn deadlocked(&self) -> bool {
        self.hub.lock().deadlocked
    }

    /// Stops every goroutine with `code`; the first abort wins.
    pub fn abort(&self, code: i32) -> i32 {
        let mut hub = self.hub.lock();
        let code = *hub.abort.get_or_insert(code);
        self.aborted.store(true, Ordering::Release);
        self.cond.notify_all();
        code
    }

    fn declare_deadlock(&self, hub: &mut MutexGuard<'_, Hub>) {
        gossa_core::error!("all {} goroutines are blocked", hub.live);
        hub.deadlocked = true;
        hub.abort.get_or_insert(2);
        self.aborted.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    fn wake(&self, hub: &mut MutexGuard<'_, Hub>) {
        hub.epoch += 1;
        hub.blocked = 0;
        self.cond.notify_all();
    }

    fn check_abort(hub: &MutexGuard<'_, Hub>) -> Flow<()> {
        match hub.abort {
            Some(code) => Err(Unwind::Exit(code)),
            None => Ok(()),
        }
    }

    /// Blocks until the next state change.
    fn wait(&self, hub: &mut MutexGuard<'_, Hub>) -> Flow<()> {
        Self::check_abort(hub)?;
        if hub.blocked + 1 >= hub.live {
            self.declare_deadlock(hub);
            return Self::check_abort(hub);
        }
        hub.blocked += 1;
        let epoch = hub.epoch;
        self.cond.wait(hub);
        if hub.epoch == epoch {
            hub.blocked = hub.blocked.saturating_sub(1);
        }
        Self::check_abort(hub)
    }

    fn next_random(&self, n: usize) -> usize {
        let mut x = self.seed.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed.store(x, Ordering::Relaxed);
        (x % n as u64) as usize
    }

    pub fn send(&self, chan: Option<&Arc<Channel>>, value: Value) -> Flow<()> {
        let mut hub = self.hub.lock();
        let Some(chan) = chan else {
            loop {
                self.wait(&mut hub)?;
            }
        };
        if chan.cap == 0 {
            return self.send_unbuffered(hub, chan, value);
        }
        loop {
            Self::check_abort(&hub)?;
            let mut state = chan.state.lock();
            if state.closed {
                return Err(panic_with("send on closed channel"));
            }
            if state.buf.len() < chan.cap {
                state.buf.push_back(value);
                drop(state);
                self.wake(&mut hub);
                return Ok(());
            }
            drop(state);
            self.wait(&mut hub)?;
        }
    }

    /// Hands `value` to a parked receiver, or parks until a receiver takes
    /// it.
    fn send_unbuffered(&self, mut hub: MutexGuard<'_, Hub>, chan: &Arc<Channel>, value: Value) -> Flow<()> {
        let me = hub.next_waiter();
        loop {
            Self::check_abort(&hub)?;
            let mut state = chan.state.lock();
            if state.closed {
                return Err(panic_with("send on closed channel"));
            }
            match chan.hand_off(&mut state, &mut hub, value.clone()) {
                Ok(()) => {
                    drop(state);
                    self.wake(&mut hub);
                    return Ok(());
                }
                Err(offered) => state.send_waiters.push_back((me, 0, offered)),
            }
            drop(state);
            let waited = self.wait(&mut hub);
            chan.unpark(me);
            if hub.completions.remove(&me).is_some() {
                return Ok(());
            }
            waited?;
        }
    }

    pub fn recv(&self, chan: Option<&Arc<Channel>>) -> Flow<(Value, bool)> {
        let mut hub = self.hub.lock();
        let Some(chan) = chan else {
            loop {
                self.wait(&mut hub)?;
            }
        };
        let me = hub.next_waiter();
        loop {
            Self::check_abort(&hub)?;
            let mut state = chan.state.lock();
            if let Some(received) = chan.try_recv(&mut state, &mut hub) {
                drop(state);
                self.wake(&mut hub);
                return Ok(received);
            }
            let parked = chan.cap == 0;
            if parked {
                state.recv_waiters.push_back((me, 0));
            }
            drop(state);
            let waited = self.wait(&mut hub);
            if parked {
                chan.unpark(me);
            }
            if let Some(Completion { value: Some(value), .. }) = hub.completions.remove(&me) {
                return Ok((value, true));
            }
            waited?;
        }
    }

    pub fn close(&self, chan: Option<&Arc<Channel>>) -> Flow<()> {
        let Some(chan) = chan else {
            return Err(panic_with("close of nil channel"));
        };
        let mut hub = self.hub.lock();
        let mut state = chan.state.lock();
        if state.closed {
            return Err(panic_with("close of closed channel"));
        }
        state.closed = true;
        drop(state);
        self.wake(&mut hub);
        Ok(())
    }

    /// Runs a `select`: the index of the chosen case (`-1` for the default
    /// of a non-blocking select) and, for a receive, what it received.
    ///
    /// A case is only chosen when it can finish at once, so a non-blocking
    /// select never waits. A blocking select parks on its unbuffered
    /// channels, where a partner goroutine may finish one of its cases.
    pub fn select(&self, cases: &[SelectCase], blocking: bool) -> Flow<(i64, Option<(Value, bool)>)> {
        let mut hub = self.hub.lock();
        let me = hub.next_waiter();
        loop {
            Self::check_abort(&hub)?;
            let ready: Vec<usize> = cases
                .iter()
                .enumerate()
                .filter(|(_, case)| match &case.chan {
                    None => false,
                    Some(chan) => {
                        let state = chan.state.lock();
                        match case.dir {
                            SelectDir::Recv => Channel::recv_ready(&state, &hub),
                            SelectDir::Send => chan.send_ready(&state, &hub),
                        }
                    }
                })
                .map(|(i, _)| i)
                .collect();

            if !ready.is_empty() {
                let index = ready[self.next_random(ready.len())];
                let case = &cases[index];
                let Some(chan) = &case.chan else {
                    continue;
                };
                let mut state = chan.state.lock();
                let received = match case.dir {
                    SelectDir::Recv => chan.try_recv(&mut state, &mut hub),
                    SelectDir::Send => {
                        if state.closed {
                            return Err(panic_with("send on closed channel"));
                        }
                        let value = case.send.clone().unwrap_or(Value::Invalid);
                        if chan.cap > 0 {
                            state.buf.push_back(value);
                        } else if chan.hand_off(&mut state, &mut hub, value).is_err() {
                            return Err(Error::internal(format!("{:?} lost its parked receiver", chan)).into());
                        }
                        None
                    }
                };
                drop(state);
                self.wake(&mut hub);
                return Ok((index as i64, received));
            }

            if !blocking {
                return Ok((-1, None));
            }
            let unbuffered = || {
                cases
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| c.chan.as_ref().filter(|ch| ch.cap == 0).map(|ch| (i, c, ch)))
            };
            for (index, case, chan) in unbuffered() {
                let mut state = chan.state.lock();
                match case.dir {
                    SelectDir::Recv => state.recv_waiters.push_back((me, index)),
                    SelectDir::Send => {
                        let value = case.send.clone().unwrap_or(Value::Invalid);
                        state.send_waiters.push_back((me, index, value));
                    }
                }
            }
            let waited = self.wait(&mut hub);
            for (_, _, chan) in unbuffered() {
                chan.unpark(me);
            }
            if let Some(done) = hub.completions.remove(&me) {
                return Ok((done.case as i64, done.value.map(|v| (v, true))));
            }
            waited?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_channel_delivers_in_order_then_reports_closed() {
        let sched = Scheduler::new();
        let ch = sched.make_chan(Type::int(), 2);
        assert!(sched.send(Some(&ch), Value::Int(1)).is_ok());
        assert!(sched.send(Some(&ch), Value::Int(2)).is_ok());
        assert!(sched.close(Some(&ch)).is_ok());
        let got: Vec<(Value, bool)> = (0..3).filter_map(|_| sched.recv(Some(&ch)).ok()).collect();
        assert_eq!(
            got,
            vec![
                (Value::Int(1), true),
                (Value::Int(2), true),
                (Value::Int(0), false)
            ]
        );
    }

    #[test]
    fn lone_receiver_on_empty_channel_is_a_deadlock() {
        let sched = Scheduler::new();
        let ch = sched.make_chan(Type::int(), 0);
        assert!(matches!(sched.recv(Some(&ch)), Err(Unwind::Exit(2))));
        assert!(sched.deadlocked());
    }

    #[test]
    fn non_blocking_select_takes_the_default() {
        let sched = Scheduler::new();
        let ch = sched.make_chan(Type::int(), 0);
        let cases = [SelectCase {
            dir: SelectDir::Recv,
            chan: Some(ch),
            send: None,
        }];
        assert!(matches!(sched.select(&cases, false), Ok((-1, None))));
    }

    #[test]
    fn double_close_panics() {
        let sched = Scheduler::new();
        let ch = sched.make_chan(Type::int(), 1);
        assert!(sched.close(Some(&ch)).is_ok());
        assert!(matches!(sched.close(Some(&ch)), Err(Unwind::Panic(_))));
    }

    fn recv_case(chan: &Arc<Channel>) -> SelectCase {
        SelectCase {
            dir: SelectDir::Recv,
            chan: Some(chan.clone()),
            send: None,
        }
    }

    /// Spins until a goroutine has parked receiving on `chan`.
    fn await_parked_receiver(chan: &Channel) {
        while chan.state.lock().recv_waiters.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    #[test]
    fn non_blocking_send_pairs_with_a_selecting_receiver_or_skips() {
        for _ in 0..50 {
            let sched = Arc::new(Scheduler::new());
            let direct = sched.make_chan(Type::int(), 0);
            let other = sched.make_chan(Type::int(), 1);
            sched.spawned();
            let (done, finished) = std::sync::mpsc::channel();
            let receiver = {
                let (sched, direct, other) = (sched.clone(), direct.clone(), other.clone());
                std::thread::spawn(move || {
                    let chosen = sched.select(&[recv_case(&direct), recv_case(&other)], true);
                    sched.exited();
                    let _ = done.send(chosen.ok());
                })
            };
            await_parked_receiver(&direct);

            assert!(sched.send(Some(&other), Value::Int(2)).is_ok());
            let offer = [SelectCase {
                dir: SelectDir::Send,
                chan: Some(direct.clone()),
                send: Some(Value::Int(1)),
            }];
            let sent = sched.select(&offer, false).ok().map(|(index, _)| index);
            let chosen = finished
                .recv_timeout(std::time::Duration::from_secs(10))
                .expect("receiving select finishes");
            receiver.join().expect("receiver thread");

            match sent {
                Some(0) => assert_eq!(chosen, Some((0, Some((Value::Int(1), true))))),
                Some(-1) => assert_eq!(chosen, Some((1, Some((Value::Int(2), true))))),
                other => panic!("unexpected select result {:?}", other),
            }
            assert!(direct.state.lock().recv_waiters.is_empty());
            assert!(direct.state.lock().send_waiters.is_empty());
        }
    }

    #[test]
    fn unbuffered_send_hands_off_to_a_parked_receiver() {
        let sched = Arc::new(Scheduler::new());
        let ch = sched.make_chan(Type::int(), 0);
        sched.spawned();
        let receiver = {
            let (sched, ch) = (sched.clone(), ch.clone());
            std::thread::spawn(move || {
                let got = sched.recv(Some(&ch)).ok();
                sched.exited();
                got
            })
        };
        await_parked_receiver(&ch);
        assert!(sched.send(Some(&ch), Value::Int(7)).is_ok());
        assert_eq!(receiver.join().expect("receiver thread"), Some((Value::Int(7), true)));
        assert!(!sched.deadlocked());
    }
}
