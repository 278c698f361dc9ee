use crossterm::event::{self, Event};
use std::sync::mpsc::{self, Receiver};

#[derive(Debug)]
pub enum InputMessage {
    Event(Event),
    ReadError(String),
}

pub type InputReceiver = Receiver<InputMessage>;

/// Events the viewer reacts to; mouse, paste and focus-gained traffic is
/// dropped on the input thread.
fn is_forwarded(event: &Event) -> bool {
    matches!(event, Event::Key(_) | Event::Resize(_, _) | Event::FocusLost)
}

/// Blocking terminal reads on a dedicated thread so the render loop never
/// stalls on input.
pub fn spawn_input_thread() -> InputReceiver {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(ev) if !is_forwarded(&ev) => continue,
            Ok(ev) => {
                if tx.send(InputMessage::Event(ev)).is_err() {
                    tracing::debug!("input receiver dropped, stopping input thread");
                    break;
                }
            }
            Err(err) => {
                tracing::warn!("terminal read failed: {err}");
                let _ = tx.send(InputMessage::ReadError(err.to_string()));
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

    #[test]
    fn only_viewer_events_are_forwarded() {
        let key = Event::Key(KeyEvent::new(KeyCode::Char('w'), KeyModifiers::NONE));
        assert!(is_forwarded(&key));
        assert!(is_forwarded(&Event::Resize(80, 24)));
        assert!(is_forwarded(&Event::FocusLost));

        let mouse = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Moved,
            column: 3,
            row: 4,
            modifiers: KeyModifiers::NONE,
        });
        assert!(!is_forwarded(&mouse));
        assert!(!is_forwarded(&Event::FocusGained));
        assert!(!is_forwarded(&Event::Paste("splat".into())));
    }
}
