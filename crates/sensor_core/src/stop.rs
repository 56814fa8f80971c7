//! Sinal de parada para os loops do sender e do receiver.
//!
//! O [`StopHandle`] é o lado emissor de um channel que nunca recebe
//! mensagens: descartá-lo desconecta o channel, e a partir daí todo
//! [`StopSignal`] ligado a ele responde "parado".

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::time::Duration;

pub struct StopHandle {
    _tx: Sender<()>,
}

impl StopHandle {
    /// Sinaliza a parada.
    pub fn stop(self) {
        drop(self);
    }
}

#[derive(Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
    // Mantém o channel aberto em `never()`
    _keep: Option<Sender<()>>,
}

/// Cria um par handle/sinal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = bounded::<()>(1);
    (StopHandle { _tx: tx }, StopSignal { rx, _keep: None })
}

impl StopSignal {
    /// Sinal que nunca dispara.
    pub fn never() -> Self {
        let (tx, rx) = bounded::<()>(1);
        Self {
            rx,
            _keep: Some(tx),
        }
    }

    pub fn is_stopped(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Espera até `timeout`. Retorna `true` se a parada foi sinalizada.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn dropping_handle_stops_every_clone() {
        let (handle, signal) = stop_channel();
        let other = signal.clone();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
        assert!(other.is_stopped());
        // Continua parado
        assert!(signal.is_stopped());
    }

    #[test]
    fn wait_times_out_while_running() {
        let (_handle, signal) = stop_channel();
        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_returns_early_on_stop() {
        let (handle, signal) = stop_channel();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.stop();
        });
        let start = Instant::now();
        assert!(signal.wait(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn never_stops() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());
        assert!(!signal.wait(Duration::from_millis(1)));
    }
}
