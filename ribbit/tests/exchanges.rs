use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use embedded_time::duration::Milliseconds;
use ribbit::core::What;
use ribbit::exchange::{Failure, Outcome};
use ribbit::req::Req;
use ribbit::resp::code;
use ribbit::test::peer;
use ribbit::time::Timeout;
use ribbit::SpecVersion;
use ribbit_msg::{number, Field, Id, Message, MessageOptions, OptNumber, OptValue, Payload, Token,
                 Type};

mod common;
use common::*;

#[test]
fn piggybacked_response() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "hello")).unwrap();

  let req = h.sent_one();
  assert_eq!(req.addr(), server());
  assert_eq!(req.data().ty, Type::Con);
  assert_eq!(req.data().uri_path(), vec!["hello"]);

  h.clock.set(40);
  h.recv(&piggyback(req.data(), "hi"));

  let resp = exchange.wait(Timeout::Millis(0)).unwrap();
  assert_eq!(resp.code(), code::CONTENT);
  assert_eq!(resp.payload_str(), Some("hi"));
  assert_eq!(resp.rtt(), Milliseconds(40u64));
  assert!(resp.is_last());
  assert!(exchange.is_closed());
  assert_eq!(exchange.outcome(), Some(Outcome::Delivered(resp)));
  assert_eq!(h.endpoint.in_flight(), 0);

  h.clock.set(60_000);
  h.poll();
  assert!(h.sent().is_empty());
}

#[test]
fn separate_response_is_acked_once_and_delivered_once() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "slow")).unwrap();
  let req = h.sent_one();

  let delivered = Arc::new(AtomicUsize::new(0));
  exchange.on_response({
            let delivered = delivered.clone();
            move |_| {
              delivered.fetch_add(1, Ordering::SeqCst);
            }
          });

  // empty ACK; the response will come later
  h.recv(&req.data().ack());
  assert!(!exchange.is_resolved());

  h.clock.set(20_000);
  h.poll();
  assert!(h.sent().is_empty(), "acknowledged requests are not retransmitted");

  let mut resp = Message::new(Type::Con, code::CONTENT);
  resp.id = Id(0x4242);
  resp.token = req.data().token;
  resp.payload = Payload(b"finally".to_vec());
  h.recv(&resp);

  let ack = h.sent_one();
  assert_eq!(ack.data().ty, Type::Ack);
  assert_eq!(ack.data().id, Id(0x4242));
  assert!(ack.data().is_empty());
  assert_eq!(exchange.response().unwrap().payload_str(), Some("finally"));

  // the ACK got lost; the server sends the response again
  h.recv(&resp);
  let ack_again = h.sent_one();
  assert_eq!(ack_again.data(), ack.data());
  assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn separate_response_never_arrives() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "slow")).unwrap();
  let req = h.sent_one();
  h.recv(&req.data().ack());

  let lifetime = h.endpoint.config().exchange_lifetime_millis();

  h.clock.set(lifetime - 1);
  h.poll();
  assert!(!exchange.is_resolved());

  h.clock.set(lifetime);
  h.poll();
  assert_eq!(exchange.failure(), Some(Failure::TimedOut));
  assert_eq!(h.endpoint.in_flight(), 0);
}

#[test]
fn con_times_out_after_max_transmissions() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "nobody-home")).unwrap();

  let first = h.sent_one();
  let mut transmissions = 1;

  for at in [1_000, 3_000, 7_000, 15_000] {
    h.clock.set(at - 1);
    h.poll();
    assert!(h.sent().is_empty(), "retransmitted early (t={})", at - 1);

    h.clock.set(at);
    h.poll();
    let again = h.sent_one();
    assert_eq!(again.data(), first.data(), "retransmissions are identical");
    transmissions += 1;
  }

  assert_eq!(transmissions, 5);

  h.clock.set(30_999);
  h.poll();
  assert!(!exchange.is_resolved());

  h.clock.set(31_000);
  h.poll();
  assert!(h.sent().is_empty());
  assert_eq!(exchange.failure(), Some(Failure::TimedOut));
  assert_eq!(exchange.wait(Timeout::Never), None);
}

#[test]
fn reset_rejects() {
  let h = harness();
  let exchange = h.endpoint.send(Req::delete(server(), "thing")).unwrap();

  let failures = Arc::new(AtomicUsize::new(0));
  exchange.on_failure({
            let failures = failures.clone();
            move |f| {
              assert_eq!(*f, Failure::Rejected);
              failures.fetch_add(1, Ordering::SeqCst);
            }
          });

  let req = h.sent_one();
  h.recv(&req.data().reset());

  assert_eq!(exchange.failure(), Some(Failure::Rejected));
  assert_eq!(exchange.outcome(), Some(Outcome::Failed(Failure::Rejected)));
  assert_eq!(failures.load(Ordering::SeqCst), 1);
  assert_eq!(h.endpoint.in_flight(), 0);
}

#[test]
fn unrecognized_critical_option_rejects() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "weird")).unwrap();
  let req = h.sent_one();
  h.recv(&req.data().ack());

  let mut resp = Message::new(Type::Con, code::CONTENT);
  resp.id = Id(7);
  resp.token = req.data().token;
  resp.add_option(OptNumber(65001), OptValue(vec![1]))
      .unwrap();
  h.recv(&resp);

  let rst = h.sent_one();
  assert_eq!(rst.data().ty, Type::Reset);
  assert_eq!(rst.data().id, Id(7));
  assert_eq!(exchange.failure(), Some(Failure::Rejected));
}

#[test]
fn strangers_are_reset() {
  let h = harness();

  let mut stray = Message::new(Type::Con, code::CONTENT);
  stray.id = Id(9);
  stray.token = Token::opaque(b"nobody asked");
  h.recv(&stray);

  let rst = h.sent_one();
  assert_eq!(rst.data().ty, Type::Reset);
  assert_eq!(rst.data().id, Id(9));

  // an ACK for nothing is dropped silently
  let mut ack = stray.clone();
  ack.ty = Type::Ack;
  ack.id = Id(10);
  h.recv(&ack);
  assert!(h.sent().is_empty());

  // so is a request; we are a client
  let mut req = Req::get(h.endpoint.local_addr(), "").msg().clone();
  req.ty = Type::Non;
  h.recv(&req);
  assert!(h.sent().is_empty());
}

#[test]
fn responses_from_the_wrong_peer_are_ignored() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "hello")).unwrap();
  let req = h.sent_one();

  let mut resp = piggyback(req.data(), "spoofed");
  resp.ty = Type::Non;
  resp.id = Id(99);
  h.recv_from(&resp, "10.0.0.66:5683".parse::<SocketAddr>().unwrap());

  assert!(!exchange.is_resolved());
  assert_eq!(h.sent_one().data().ty, Type::Reset);
}

#[test]
fn wait_times_out() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "hello")).unwrap();

  assert_eq!(exchange.wait(Timeout::Millis(10)), None);
  assert!(!exchange.is_resolved());
}

#[test]
fn cancel() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "hello")).unwrap();
  let req = h.sent_one();

  h.endpoint.cancel(&exchange).unwrap();
  assert_eq!(exchange.failure(), Some(Failure::Cancelled));
  assert_eq!(h.endpoint.in_flight(), 0);

  h.clock.set(1_000);
  h.poll();
  assert!(h.sent().is_empty(), "cancelled requests are not retransmitted");

  // the late response goes nowhere
  h.recv(&piggyback(req.data(), "too late"));
  assert_eq!(exchange.response(), None);

  assert_eq!(h.endpoint.cancel(&exchange).unwrap_err().what, What::NotFound);
}

#[test]
fn explicit_tokens_must_be_unique() {
  let h = harness();
  let mut req = Req::get(server(), "a");
  req.set_token(Token::opaque(b"mine"));

  let exchange = h.endpoint.send(req.clone()).unwrap();
  assert_eq!(exchange.token(), Token::opaque(b"mine"));

  let err = h.endpoint.send(req).unwrap_err();
  assert_eq!(err.what, What::TokenInUse(Token::opaque(b"mine")));
  assert_eq!(h.sent().len(), 1);
}

#[test]
fn overlong_path_segments_are_not_sent() {
  let h = harness();
  let req = Req::get(server(), "é".repeat(200));

  let err = h.endpoint.send(req).unwrap_err();
  assert!(matches!(err.what, What::InvalidOption(e) if e.field() == Field::Option(number::URI_PATH)));
  assert!(h.sent().is_empty());
  assert_eq!(h.endpoint.in_flight(), 0);
}

#[test]
fn generated_tokens_and_ids_differ() {
  let h = harness();
  let a = h.endpoint.send(Req::get(server(), "a")).unwrap();
  let b = h.endpoint.send(Req::get(server(), "b")).unwrap();

  let sent = h.sent();
  assert_ne!(a.token(), b.token());
  assert_ne!(sent[0].data().id, sent[1].data().id);
  assert_eq!(sent[0].data().token, a.token());
}

#[test]
fn non_request_times_out_without_retransmitting() {
  let h = harness();
  let mut req = Req::get(server(), "fire-and-forget");
  req.non();
  let exchange = h.endpoint.send(req).unwrap();
  assert_eq!(h.sent_one().data().ty, Type::Non);

  let timeout = h.endpoint.config().msg.non.response_timeout.0;

  h.clock.set(timeout - 1);
  h.poll();
  assert!(h.sent().is_empty());
  assert!(!exchange.is_resolved());

  h.clock.set(timeout);
  h.poll();
  assert_eq!(exchange.failure(), Some(Failure::TimedOut));
}

#[test]
fn multicast_collects_responses_until_timeout() {
  let h = harness();
  let group = SocketAddr::from(([224, 0, 1, 187], 5683));
  let exchange = h.endpoint.send(Req::get(group, "who")).unwrap();

  let req = h.sent_one();
  assert_eq!(req.data().ty, Type::Non);
  assert_eq!(req.addr(), group);

  for (n, port) in [1001u16, 1002].into_iter().enumerate() {
    let mut resp = Message::new(Type::Non, code::CONTENT);
    resp.id = Id(n as u16);
    resp.token = req.data().token;
    resp.payload = Payload(format!("node {}", port).into_bytes());
    h.recv_from(&resp, peer(port));
  }

  let first = exchange.next_notification(Timeout::Millis(0)).unwrap();
  let second = exchange.next_notification(Timeout::Millis(0)).unwrap();
  assert_eq!(first.payload_str(), Some("node 1001"));
  assert_eq!(second.source(), peer(1002));
  assert!(!exchange.is_closed());

  h.clock.set(h.endpoint.config().msg.non.response_timeout.0);
  h.poll();
  assert!(exchange.is_closed());
  assert_eq!(exchange.failure(), None);
  assert_eq!(exchange.outcome(), Some(Outcome::Delivered(second)));
}

#[test]
fn draft_codecs() {
  for version in [SpecVersion::Draft12, SpecVersion::Draft08] {
    let mut config = config();
    config.msg.spec_version = version;
    let h = harness_with(config);

    let exchange = h.endpoint.send(Req::get(server(), "legacy")).unwrap();
    let req = h.sock.take_sent_with(version).remove(0);
    assert_eq!(req.data().uri_path(), vec!["legacy"]);

    h.sock
     .push_msg_with(version, &piggyback(req.data(), "old but gold"), server());
    h.poll();

    assert_eq!(exchange.response().unwrap().payload_str(),
               Some("old but gold"),
               "{}",
               version);
  }
}

#[test]
fn garbage_is_dropped() {
  let h = harness();
  let exchange = h.endpoint.send(Req::get(server(), "hello")).unwrap();
  h.sent_one();

  h.sock.push_rx(ribbit::net::Addrd(vec![0xff, 0x00], server()));
  h.poll();

  assert!(!exchange.is_resolved());
  assert!(h.sent().is_empty());
}

#[test]
fn driver_polls_in_the_background() {
  let h = harness();
  let sock = h.sock.clone();
  let endpoint = Arc::new(h.endpoint);
  let driver = ribbit::std::Driver::spawn(endpoint.clone()).unwrap();

  let exchange = endpoint.send(Req::get(server(), "hello")).unwrap();
  let req = sock.take_sent().remove(0);
  sock.push_msg(&piggyback(req.data(), "from another thread"), server());

  let resp = exchange.wait(Timeout::Millis(5_000)).unwrap();
  assert_eq!(resp.payload_str(), Some("from another thread"));

  driver.stop();
}
