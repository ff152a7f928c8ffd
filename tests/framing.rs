mod common;

use cloudlockr::config::LINK_BUFFER_SZ;
use cloudlockr::controller::Error;
use cloudlockr::link::{Frame, Framer};

use common::*;

#[test]
fn fragments_are_acknowledged_before_the_message() {
    let mut controller = controller();
    controller
        .link_mut()
        .push_raw(b"{\"type\":7,\r\n\"password\":\r\n\"pw\"}\x0b\n");
    controller.handle_next().unwrap();
    assert_eq!(
        controller.link_mut().take_responses(),
        [r#"{"status":2}"#, r#"{"status":2}"#, OK, OK]
    );
    assert_eq!(controller.session().secret(), Some("pw"));
}

#[test]
fn same_message_twice_is_handled_twice() {
    let mut controller = controller();
    let message = r#"{"type":7,"password":"pw"}"#;
    send(&mut controller, message).unwrap();
    send(&mut controller, message).unwrap();
    assert_eq!(controller.link_mut().take_responses(), [OK; 4]);
}

#[test]
fn overflow_is_reported_and_the_link_recovers() {
    let mut controller = controller();
    controller.link_mut().push_raw(&vec![b'x'; LINK_BUFFER_SZ + 1]);
    assert_eq!(controller.handle_next(), Err(Error::FramingOverflow));
    assert_eq!(controller.link_mut().take_responses(), [r#"{"status":3}"#]);

    send(&mut controller, r#"{"type":7,"password":"pw"}"#).unwrap();
    assert_eq!(controller.link_mut().take_responses(), [OK, OK]);
}

#[test]
fn overflow_discards_only_the_open_fragment() {
    let mut framer: Framer<16> = Framer::new();
    let mut frames = Vec::new();
    for b in b"{\"a\":\r\n".iter().chain(&[b'z'; 12]) {
        frames.extend(framer.push(*b));
    }
    assert_eq!(frames, [Frame::Fragment, Frame::Overflow]);
    assert_eq!(framer.len(), 5);

    for b in b"1}\x0b\n" {
        frames.extend(framer.push(*b));
    }
    assert_eq!(frames.last(), Some(&Frame::Message(b"{\"a\":1}".to_vec())));
}
