/*! Streaming execution.

The streaming interface performs exactly the work of the greedy executor,
one byte per [`Validator::feed`] call, suspending between bytes. Feeding
every byte of an input and then calling [`Validator::end_of_stream`]
yields the same accept/reject outcome and the same closed captures as a
one-shot [`Validator::validate`] over the whole input.
*/

use std::fmt::{self, Display, Formatter};

use crate::validator::{ErrorKind, ValidationError, Validator};

/// The state of a streaming validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// No byte has been fed since the last reset.
    Ready,
    /// At least one byte has been fed.
    Processing,
    /// More input is needed to reach an accept state.
    WaitingForInput,
    /// The machine is in an accept state.
    Complete,
    /// The stream failed; terminal until a reset.
    Error,
}

impl Display for StreamStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamStatus::Ready => "READY",
            StreamStatus::Processing => "PROCESSING",
            StreamStatus::WaitingForInput => "WAITING_FOR_INPUT",
            StreamStatus::Complete => "COMPLETE",
            StreamStatus::Error => "ERROR",
        })
    }
}

impl Validator<'_> {
    /// Feeds one byte to the machine.
    ///
    /// The first call moves the stream from READY to PROCESSING. Returns
    /// [`StreamStatus::Complete`] if the byte left the machine in an
    /// accept state, [`StreamStatus::WaitingForInput`] otherwise, or
    /// [`StreamStatus::Error`] if no transition admitted the byte (the
    /// error record is retained, see [`Validator::last_error`]).
    pub fn feed(&mut self, byte: u8) -> StreamStatus {
        if !self.streaming {
            self.streaming = true;
            self.stream = StreamStatus::Processing;
            if !self.fsm.start_state().is_valid() {
                self.fail_no_start();
                self.stream = StreamStatus::Error;
                return self.stream;
            }
        }

        let position = self.captures.position();
        if !self.step(byte, position, &[byte], position) {
            self.stream = StreamStatus::Error;
            return self.stream;
        }
        if self.debug.has_collect_metrics() {
            self.metrics.characters_processed += 1;
        }
        self.captures.record(byte);
        self.captures.set_position(position + 1);

        self.stream = if self.in_accept_state() {
            StreamStatus::Complete
        } else {
            StreamStatus::WaitingForInput
        };
        self.stream
    }

    /// Feeds a chunk of bytes, stopping early on error.
    pub fn feed_chunk(&mut self, chunk: &[u8]) -> StreamStatus {
        for &byte in chunk {
            if self.feed(byte) == StreamStatus::Error {
                return StreamStatus::Error;
            }
        }
        self.stream
    }

    /// Signals the end of the input stream.
    ///
    /// Runs the epsilon closure once and returns
    /// [`StreamStatus::Complete`] if the machine is in an accept state.
    /// Calling this before any byte was fed is an
    /// [`ErrorKind::UnexpectedEndOfInput`] error.
    pub fn end_of_stream(&mut self) -> StreamStatus {
        if !self.streaming {
            let error = ValidationError {
                kind: ErrorKind::UnexpectedEndOfInput,
                position: 0,
                byte: 0,
                state: self.current.clone(),
                message: "end of stream before any input was fed".to_string(),
                attempted: Vec::new(),
                input_context: String::new(),
            };
            self.record_error(error);
            self.stream = StreamStatus::Error;
            return self.stream;
        }

        let position = self.captures.position();
        self.close_epsilon(position);

        if !self.in_accept_state() {
            self.fail_not_accept(position, &[], position);
            self.stream = StreamStatus::Error;
            return self.stream;
        }

        self.stream = StreamStatus::Complete;
        self.stream
    }

    /// The current stream status.
    pub fn stream_status(&self) -> StreamStatus {
        self.stream
    }

    /// Returns `true` if the stream has completed in an accept state.
    pub fn is_stream_complete(&self) -> bool {
        self.stream == StreamStatus::Complete
    }

    /// Returns `true` if the stream is waiting for more input.
    pub fn needs_more_input(&self) -> bool {
        self.stream == StreamStatus::WaitingForInput
    }

    /// Returns the stream status to READY without touching the current
    /// state, captures, or anything else; use [`Validator::reset`] for a
    /// full reset.
    pub fn reset_stream(&mut self) {
        self.stream = StreamStatus::Ready;
        self.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::charclass::CharClass;
    use crate::debug::{DebugFlag, DebugFlags};
    use crate::graph::FsmBuilder;
    use crate::validator::{ErrorKind, StreamStatus, Validator};

    fn three_digits() -> crate::graph::Fsm {
        FsmBuilder::new("three_digits")
            .transition("START", "D1", CharClass::digit())
            .transition("D1", "D2", CharClass::digit())
            .transition("D2", "ACCEPT", CharClass::digit())
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap()
    }

    #[test]
    fn single_byte_completes() {
        let fsm = FsmBuilder::new("digit")
            .transition("START", "ACCEPT", CharClass::digit())
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert_eq!(StreamStatus::Complete, validator.feed(b'5'));
        assert!(validator.is_stream_complete());
        assert!(validator.in_accept_state());
    }

    #[test]
    fn waits_until_accepting() {
        let fsm = three_digits();
        let mut validator = Validator::new(&fsm);

        assert_eq!(StreamStatus::WaitingForInput, validator.feed(b'1'));
        assert!(validator.needs_more_input());
        assert_eq!(StreamStatus::WaitingForInput, validator.feed(b'2'));
        assert_eq!(StreamStatus::Complete, validator.feed(b'3'));
    }

    #[test]
    fn chunk_feeding() {
        let fsm = three_digits();
        let mut validator = Validator::new(&fsm);
        assert_eq!(StreamStatus::Complete, validator.feed_chunk(b"123"));
    }

    #[test]
    fn bad_byte_is_terminal() {
        let fsm = three_digits();
        let mut validator = Validator::new(&fsm);

        assert_eq!(StreamStatus::Error, validator.feed(b'a'));
        assert!(!validator.is_stream_complete());
        let error = validator.last_error().unwrap();
        assert_eq!(ErrorKind::NoMatchingTransition, error.kind);
        assert_eq!(0, error.position);
        assert_eq!(b'a', error.byte);
    }

    #[test]
    fn chunk_stops_at_first_error() {
        let fsm = three_digits();
        let mut validator = Validator::new(&fsm);

        assert_eq!(StreamStatus::Error, validator.feed_chunk(b"1x3"));
        assert_eq!(1, validator.last_error().unwrap().position);
    }

    #[test]
    fn end_of_stream_runs_the_closure() {
        let fsm = FsmBuilder::new("digits_then_epsilon")
            .transition("START", "DIGITS", CharClass::digit())
            .transition("DIGITS", "DIGITS", CharClass::digit())
            .epsilon("DIGITS", "ACCEPT")
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert_eq!(StreamStatus::WaitingForInput, validator.feed_chunk(b"123"));
        assert_eq!(StreamStatus::Complete, validator.end_of_stream());
    }

    #[test]
    fn end_of_stream_short_input_errors() {
        let fsm = three_digits();
        let mut validator = Validator::new(&fsm);

        validator.feed_chunk(b"12");
        assert_eq!(StreamStatus::Error, validator.end_of_stream());
        assert_eq!(
            ErrorKind::NotInAcceptState,
            validator.last_error().unwrap().kind
        );
    }

    #[test]
    fn end_of_stream_without_input_errors() {
        let fsm = three_digits();
        let mut validator = Validator::new(&fsm);

        assert_eq!(StreamStatus::Error, validator.end_of_stream());
        assert_eq!(
            ErrorKind::UnexpectedEndOfInput,
            validator.last_error().unwrap().kind
        );
    }

    #[test]
    fn reset_restores_the_stream() {
        let fsm = FsmBuilder::new("digit")
            .transition("START", "ACCEPT", CharClass::digit())
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        validator.feed(b'5');
        assert!(validator.is_stream_complete());

        validator.reset();
        assert_eq!(StreamStatus::Ready, validator.stream_status());
        assert_eq!(StreamStatus::Complete, validator.feed(b'7'));
    }

    #[test]
    fn reset_stream_touches_only_the_stream() {
        let fsm = FsmBuilder::new("digit")
            .transition("START", "ACCEPT", CharClass::digit())
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        validator.feed(b'5');
        assert!(validator.is_stream_complete());

        validator.reset_stream();
        assert_eq!(StreamStatus::Ready, validator.stream_status());
        assert!(!validator.is_stream_complete());
        // The current state is untouched.
        assert!(validator.in_accept_state());
    }

    #[test]
    fn streaming_with_captures() {
        let fsm = FsmBuilder::new("capture_digits")
            .transition("START", "DIGITS", CharClass::digit())
            .transition("DIGITS", "DIGITS", CharClass::digit())
            .epsilon("DIGITS", "ACCEPT")
            .on_entry("DIGITS", |captures, _| {
                let _ = captures.begin("digits");
            })
            .on_exit("DIGITS", |captures, _| {
                let _ = captures.end("digits");
            })
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        validator.feed(b'1');
        validator.feed(b'2');
        validator.feed(b'3');
        validator.end_of_stream();

        assert!(validator.is_stream_complete());
        let capture = validator.captures().get("digits").unwrap();
        assert_eq!(b"123", capture.value());
        assert_eq!(0, capture.start());
        assert_eq!(3, capture.end());
    }

    #[test]
    fn streaming_metrics() {
        let fsm = FsmBuilder::new("digits")
            .transition("START", "DIGITS", CharClass::digit())
            .transition("DIGITS", "DIGITS", CharClass::digit())
            .epsilon("DIGITS", "ACCEPT")
            .start("START")
            .accept("ACCEPT")
            .debug_flags(DebugFlags::none() | DebugFlag::CollectMetrics)
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        validator.feed_chunk(b"12345");
        validator.end_of_stream();

        assert_eq!(5, validator.metrics().characters_processed);
        assert_eq!(5, validator.metrics().transitions_taken);
        assert_eq!(1, validator.metrics().epsilon_transitions);
    }

    #[test]
    fn long_stream_stays_accepting() {
        let fsm = FsmBuilder::new("many_digits")
            .transition("START", "DIGITS", CharClass::digit())
            .transition("DIGITS", "DIGITS", CharClass::digit())
            .start("START")
            .accept("DIGITS")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        for i in 0..10_000u32 {
            let digit = b'0' + (i % 10) as u8;
            assert_ne!(StreamStatus::Error, validator.feed(digit));
        }
        assert!(validator.is_stream_complete());
    }

    #[test]
    fn status_display_forms() {
        assert_eq!("READY", StreamStatus::Ready.to_string());
        assert_eq!("PROCESSING", StreamStatus::Processing.to_string());
        assert_eq!("WAITING_FOR_INPUT", StreamStatus::WaitingForInput.to_string());
        assert_eq!("COMPLETE", StreamStatus::Complete.to_string());
        assert_eq!("ERROR", StreamStatus::Error.to_string());
    }
}
