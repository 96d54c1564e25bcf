use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::drivers::source::{Board, Instrument};
use crate::drivers::BenchError;
use crate::types::VarType;

const DEGAUSS_FIRST_WAIT: Duration = Duration::from_millis(300);
const DEGAUSS_SECOND_WAIT: Duration = Duration::from_millis(150);

/// Per-bench values the acquisition needs besides the two links.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionSettings {
    pub channel: u8,
    pub leakage_variable: u8,
    pub leakage_type: VarType,
    pub board_scale: f64,
    pub reference_scale: f64,
    /// Wait after applying the reference current.
    pub settle: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            channel: 1,
            leakage_variable: 53,
            leakage_type: VarType::Float,
            board_scale: 1000.0,
            reference_scale: 1000.0,
            settle: Duration::from_millis(150),
        }
    }
}

/// Connection handles for one bench plus how to read it.
pub struct BenchSession<I, B> {
    pub instrument: I,
    pub board: B,
    pub settings: SessionSettings,
}

impl<I: Instrument, B: Board> BenchSession<I, B> {
    pub fn new(instrument: I, board: B, settings: SessionSettings) -> Self {
        Self {
            instrument,
            board,
            settings,
        }
    }

    /// Reads the reference instrument, then the board. Returns `(measured_ma, reference_ma)`.
    pub fn read_pair(&mut self) -> Result<(f64, f64), BenchError> {
        let reference_amps = self
            .instrument
            .query_dc_current(self.settings.channel)
            .map_err(BenchError::instrument)?;
        let measured = self
            .board
            .read_variable(self.settings.leakage_variable, self.settings.leakage_type)
            .map_err(BenchError::board)?;
        Ok((
            measured * self.settings.board_scale,
            reference_amps * self.settings.reference_scale,
        ))
    }

    /// Drops the instrument output and pulses the board interlock reset twice.
    pub fn degauss(&mut self) -> Result<(), BenchError> {
        info!("Applying degaussing process");
        self.instrument
            .disable_output()
            .map_err(BenchError::instrument)?;
        self.board.reset_interlocks().map_err(BenchError::board)?;
        thread::sleep(DEGAUSS_FIRST_WAIT);
        self.board.reset_interlocks().map_err(BenchError::board)?;
        thread::sleep(DEGAUSS_SECOND_WAIT);
        Ok(())
    }

    /// Sets the excitation current and returns the read-back value in amperes.
    pub fn apply_reference(&mut self, amps: f64) -> Result<f64, BenchError> {
        if !amps.is_finite() {
            return Err(BenchError::InvalidParameter(format!(
                "reference current must be finite, got {amps}"
            )));
        }
        self.instrument
            .set_current(amps)
            .map_err(BenchError::instrument)?;
        let actual = self
            .instrument
            .measure_current()
            .map_err(BenchError::instrument)?;
        debug!("reference set to {amps} A, read back {actual} A");
        thread::sleep(self.settings.settle);
        Ok(actual)
    }

    pub fn shutdown(&mut self) -> Result<(), BenchError> {
        self.instrument
            .disable_output()
            .map_err(BenchError::instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::fakes::{ScriptedBoard, ScriptedInstrument};
    use crate::drivers::LinkError;
    use crate::types::LinkKind;

    fn quick_settings() -> SessionSettings {
        SessionSettings {
            settle: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn read_pair_scales_both_sides_to_milliamps() {
        let mut session = BenchSession::new(
            ScriptedInstrument::new([0.0011]),
            ScriptedBoard::new([0.001]),
            quick_settings(),
        );
        let (measured, reference) = session.read_pair().unwrap();
        assert!((measured - 1.0).abs() < 1e-12);
        assert!((reference - 1.1).abs() < 1e-12);
        assert_eq!(session.board.reads, vec![(53, VarType::Float)]);
        assert_eq!(session.instrument.calls, vec!["query_dc_current(1)"]);
    }

    #[test]
    fn board_failure_is_tagged_with_its_link() {
        let mut session = BenchSession::new(
            ScriptedInstrument::new([0.0]),
            ScriptedBoard::with_results([Err(LinkError::Timeout)]),
            quick_settings(),
        );
        match session.read_pair() {
            Err(BenchError::CommunicationFailure { link, source }) => {
                assert_eq!(link, LinkKind::Board);
                assert!(matches!(source, LinkError::Timeout));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn degauss_disables_output_and_resets_twice() {
        let mut session = BenchSession::new(
            ScriptedInstrument::default(),
            ScriptedBoard::default(),
            quick_settings(),
        );
        session.apply_reference(1.0).unwrap();
        session.degauss().unwrap();
        assert!(!session.instrument.output_enabled);
        assert_eq!(session.board.interlock_resets, 2);
    }

    #[test]
    fn apply_reference_returns_readback() {
        let mut session = BenchSession::new(
            ScriptedInstrument::default(),
            ScriptedBoard::default(),
            quick_settings(),
        );
        assert_eq!(session.apply_reference(0.25).unwrap(), 0.25);
        assert_eq!(
            session.instrument.calls,
            vec!["set_current(0.25)", "measure_current"]
        );
        assert!(session.apply_reference(f64::NAN).is_err());
    }
}
