use bytes::{BufMut, Bytes, BytesMut};
use relayq_protocol::frame::HEADER_LEN;
use relayq_protocol::{Envelope, Frame, FrameType, ProtocolError, RoutingId};

fn encoded(frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    frame.encode(&mut buf);
    buf
}

#[test]
fn decode_waits_for_the_whole_frame() {
    let frame = Frame::request(7, "billing", Bytes::from_static(b"charge"));
    let full = encoded(&frame);

    let mut partial = BytesMut::from(&full[..full.len() - 3]);
    assert!(Frame::decode(&mut partial).unwrap().is_none());
    assert_eq!(partial.len(), full.len() - 3, "partial decode must not consume bytes");

    partial.extend_from_slice(&full[full.len() - 3..]);
    let decoded = Frame::decode(&mut partial).unwrap().expect("frame");
    assert_eq!(decoded, frame);
    assert!(partial.is_empty());
}

#[test]
fn decode_consumes_back_to_back_frames_in_order() {
    let mut buf = BytesMut::new();
    Frame::ready("x").encode(&mut buf);
    Frame::heartbeat(3, None).encode(&mut buf);
    Frame::disconnect().encode(&mut buf);

    let types: Vec<FrameType> = std::iter::from_fn(|| Frame::decode(&mut buf).unwrap())
        .map(|f| f.frame_type)
        .collect();

    assert_eq!(
        types,
        vec![FrameType::Ready, FrameType::Heartbeat, FrameType::Disconnect]
    );
}

#[test]
fn corrupted_body_is_rejected() {
    let mut buf = encoded(&Frame::request(1, "x", Bytes::from_static(b"payload")));
    let last = buf.len() - 1;
    buf[last] ^= 0xff;

    match Frame::decode(&mut buf) {
        Err(ProtocolError::ChecksumMismatch { .. }) => {}
        other => panic!("expected checksum mismatch, got {:?}", other),
    }
}

#[test]
fn unknown_frame_type_and_version_are_rejected() {
    let mut buf = encoded(&Frame::disconnect());
    buf[1] = 42;
    assert!(matches!(
        Frame::decode(&mut buf),
        Err(ProtocolError::UnknownFrameType(42))
    ));

    let mut buf = encoded(&Frame::disconnect());
    buf[0] = 9;
    assert!(matches!(
        Frame::decode(&mut buf),
        Err(ProtocolError::UnsupportedVersion(9))
    ));
}

#[test]
fn oversized_body_is_rejected_before_buffering() {
    let mut buf = BytesMut::new();
    buf.put_u8(1);
    buf.put_u8(FrameType::Request as u8);
    buf.put_u32(0);
    buf.put_u16(1);
    buf.put_u32(u32::MAX);
    buf.put_u32(0);
    assert_eq!(buf.len(), HEADER_LEN);

    assert!(matches!(
        Frame::decode(&mut buf),
        Err(ProtocolError::FrameTooLarge(_))
    ));
}

#[test]
fn routing_identity_is_prepended_and_stripped() {
    let client = RoutingId::new(0xdead_beef);
    let mut frame = Frame::request(11, "x", Bytes::from_static(b"hi"));
    frame.push_identity(client);
    assert_eq!(frame.parts.len(), 3);

    let mut decoded = Frame::decode(&mut encoded(&frame)).unwrap().unwrap();
    assert_eq!(decoded.pop_identity().unwrap(), client);

    let envelope = Envelope::from_parts(&decoded.parts).unwrap();
    assert_eq!(envelope.service, "x");
    assert_eq!(envelope.payload, Bytes::from_static(b"hi"));
}

#[test]
fn envelope_requires_service_and_payload() {
    let only_service = vec![Bytes::from_static(b"x")];
    assert!(Envelope::from_parts(&only_service).is_err());

    let empty_service = vec![Bytes::new(), Bytes::from_static(b"p")];
    assert!(Envelope::from_parts(&empty_service).is_err());
}
