use rmpv::Value;
use uconnect::error::CodecError;
use uconnect::wire::{
    FrameKind, MessagePackCodec, Metadata, Payload, Request, Response, StatusCode, WireCodec,
};

fn encode(value: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, value).expect("value should encode");
    bytes
}

#[test]
fn decodes_a_minimal_request() {
    let bytes = encode(&Value::Array(vec![
        Value::from(12u64),
        Value::from("Hello.Echo"),
        Value::from(u8::from(FrameKind::UnaryClient)),
    ]));

    let request = MessagePackCodec::new()
        .decode_request(&bytes)
        .expect("request should decode");

    assert_eq!(request, Request::new(12, "Hello.Echo", FrameKind::UnaryClient));
}

#[test]
fn decodes_payload_and_meta() {
    let bytes = encode(&Value::Array(vec![
        Value::from(1u64),
        Value::from("Hello.Echo"),
        Value::from(3u8),
        Value::Map(vec![(Value::from("name"), Value::from("world"))]),
        Value::Map(vec![(Value::from("token"), Value::from("secret"))]),
    ]));

    let request = MessagePackCodec::new()
        .decode_request(&bytes)
        .expect("request should decode");

    assert_eq!(
        request.payload,
        Some(Value::Map(vec![(Value::from("name"), Value::from("world"))]))
    );
    let meta = request.meta.expect("meta should decode");
    assert_eq!(meta.get("token").map(String::as_str), Some("secret"));
}

#[test]
fn nil_payload_is_absent() {
    let bytes = encode(&Value::Array(vec![
        Value::from(1u64),
        Value::from("Hello.Echo"),
        Value::from(3u8),
        Value::Nil,
        Value::Nil,
    ]));

    let request = MessagePackCodec::new()
        .decode_request(&bytes)
        .expect("request should decode");
    assert_eq!(request.payload, None);
    assert_eq!(request.meta, None);
}

#[test]
fn rejects_malformed_frames() {
    let codec = MessagePackCodec::new();

    let not_an_array = encode(&Value::from("hello"));
    assert!(matches!(
        codec.decode_request(&not_an_array),
        Err(CodecError::InvalidFrame(_))
    ));

    let unknown_kind = encode(&Value::Array(vec![
        Value::from(1u64),
        Value::from("Hello.Echo"),
        Value::from(42u8),
    ]));
    assert_eq!(
        codec.decode_request(&unknown_kind),
        Err(CodecError::UnknownFrameKind(42))
    );

    let negative_id = encode(&Value::Array(vec![
        Value::from(-1i64),
        Value::from("Hello.Echo"),
        Value::from(3u8),
    ]));
    assert!(codec.decode_request(&negative_id).is_err());

    let bad_meta = encode(&Value::Array(vec![
        Value::from(1u64),
        Value::from("Hello.Echo"),
        Value::from(3u8),
        Value::Nil,
        Value::Map(vec![(Value::from("n"), Value::from(1u8))]),
    ]));
    assert!(matches!(
        codec.decode_request(&bad_meta),
        Err(CodecError::InvalidFrame(_))
    ));

    assert!(matches!(
        codec.decode_request(&[0xc1]),
        Err(CodecError::Decode(_))
    ));
    assert!(codec.decode_request(&[]).is_err());
}

#[test]
fn rejects_trailing_bytes() {
    let mut bytes = encode(&Value::Array(vec![
        Value::from(1u64),
        Value::from("Hello.Echo"),
        Value::from(3u8),
    ]));
    bytes.push(0xc0);

    assert_eq!(
        MessagePackCodec::new().decode_request(&bytes),
        Err(CodecError::TrailingBytes)
    );
}

#[test]
fn responses_are_seven_positional_fields() {
    let response = Response::new(5, "Hello.Count", FrameKind::StreamEnd)
        .with_status(StatusCode::NotFound)
        .with_error("Method Hello.Count not found");

    let bytes = MessagePackCodec::new()
        .encode_response(response)
        .expect("response should encode");
    let value = rmpv::decode::read_value(&mut bytes.as_slice()).expect("bytes should decode");

    assert_eq!(
        value,
        Value::Array(vec![
            Value::from(5u64),
            Value::from("Hello.Count"),
            Value::from(8u8),
            Value::Nil,
            Value::from(5u8),
            Value::Nil,
            Value::from("Method Hello.Count not found"),
        ])
    );
}

#[test]
fn client_helpers_speak_the_same_protocol() {
    let codec = MessagePackCodec::new();
    let mut meta = Metadata::new();
    meta.insert("trace".into(), "t-1".into());

    let request = Request::new(9, "Hello.Echo", FrameKind::UnaryClient)
        .with_payload("hi")
        .with_meta(meta.clone());
    let bytes = codec
        .encode_request(request.clone())
        .expect("request should encode");
    assert_eq!(codec.decode_request(&bytes), Ok(request));

    let mut response = Response::new(9, "Hello.Echo", FrameKind::UnaryClient)
        .with_payload(Payload::from("hi"))
        .with_status(StatusCode::Ok);
    response.meta = Some(meta);
    let bytes = codec
        .encode_response(response.clone())
        .expect("response should encode");
    assert_eq!(codec.decode_response(&bytes), Ok(response));
}
