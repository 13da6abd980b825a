use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use rand::{RngCore, SeedableRng};
use ribbit_msg::{number, Codec, ContentFormat, Id, Message, MessageOptions, ObserveAction, Payload,
                 SetError, Token, Type};
use tinyvec::ArrayVec;

mod error;
#[doc(inline)]
pub use error::*;

use crate::block::{Assembler, Piece, Upload};
use crate::config::{self, Config};
use crate::exchange::{Exchange, Failure};
use crate::link_format::WELL_KNOWN_CORE;
use crate::logging::{self, TARGET};
use crate::net::{Addrd, Socket};
use crate::observe::{is_newer, ObserveRelation};
use crate::req::{Req, ReqBuilder};
use crate::resp::{code, Resp};
use crate::retry::{RetryTimer, YouShould};
use crate::time::{millis_between, millis_since_epoch, Clock};

/// Something the endpoint decided to do while holding its lock,
/// performed once the lock is released.
enum Effect {
  Send(Addrd<Vec<u8>>),
  /// Notifications carry a stamp, so the exchange can drop
  /// deliveries performed after a newer one
  Deliver(Exchange, Resp, Option<u64>),
  Fail(Exchange, Failure),
  Close(Exchange),
  Supersede(Exchange, Exchange),
}

/// A request we sent and are still interested in
struct Outbound<C: Clock> {
  /// The request exactly as it was last transmitted
  req: Req,
  exchange: Exchange,
  bytes: Vec<u8>,
  sent_at: Instant<C>,
  /// Present while a CON transmission awaits its ACK
  retry: Option<RetryTimer<C>>,
  acked_at: Option<Instant<C>>,
  observe: Option<ObserveRelation<C>>,
  block2: Option<Assembler>,
  /// Observe sequence number of the first block of the body being reassembled
  block2_seq: Option<u32>,
  upload: Option<Upload>,
  /// Some response was delivered (multicast requests stay open after that)
  delivered: bool,
  /// This is an Observe=1 GET; notifications on the token are stale
  deregistering: bool,
  cancelled_at: Option<Instant<C>>,
}

impl<C: Clock> Outbound<C> {
  fn new(req: Req, exchange: Exchange, now: Instant<C>) -> Self {
    Self { req,
           exchange,
           bytes: Vec::new(),
           sent_at: now,
           retry: None,
           acked_at: None,
           observe: None,
           block2: None,
           block2_seq: None,
           upload: None,
           delivered: false,
           deregistering: false,
           cancelled_at: None }
  }

  fn token(&self) -> Token {
    self.exchange.token()
  }

  fn sent_from(&self, addr: SocketAddr) -> bool {
    self.req.is_multicast() || self.req.dest() == addr
  }
}

/// A CoAP ping awaiting its Reset
struct Ping<C: Clock> {
  exchange: Exchange,
  bytes: Vec<u8>,
  sent_at: Instant<C>,
  retry: RetryTimer<C>,
}

/// A message from a peer that we already processed
struct Seen<C: Clock> {
  at: Instant<C>,
  /// What we answered it with, sent again when it is duplicated
  reply: Option<Vec<u8>>,
}

struct Registry<C: Clock> {
  outbound: HashMap<Token, Outbound<C>>,
  by_id: HashMap<(SocketAddr, Id), Token>,
  pings: HashMap<(SocketAddr, Id), Ping<C>>,
  seen: HashMap<(SocketAddr, Id), Seen<C>>,
  next_id: Id,
  tokens_issued: u64,
  deliveries: u64,
  rng: rand_chacha::ChaCha8Rng,
}

type Effects = Vec<Effect>;

/// Set the Block1, Size1 & payload of `req` to the upload's current block
fn load_block1(req: &mut Req, upload: &Upload) -> Result<(), SetError> {
  let (block, payload) = upload.current();
  let payload = payload.to_vec();

  req.set_block1(block)?;
  req.set_size1(upload.total_len() as u32)?;
  req.set_payload(payload);
  Ok(())
}

impl<C: Clock> Registry<C> {
  fn new(config: &Config) -> Self {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(config.msg.token_seed.into());

    Self { outbound: HashMap::new(),
           by_id: HashMap::new(),
           pings: HashMap::new(),
           seen: HashMap::new(),
           next_id: Id(rng.next_u32() as u16),
           tokens_issued: 0,
           deliveries: 0,
           rng }
  }

  fn next_id(&mut self, dest: SocketAddr) -> Id {
    loop {
      let id = self.next_id;
      self.next_id = id.next();

      if !self.by_id.contains_key(&(dest, id)) && !self.pings.contains_key(&(dest, id)) {
        return id;
      }
    }
  }

  fn next_token(&mut self, config: &config::Msg, now: Instant<C>) -> Token {
    loop {
      self.tokens_issued += 1;

      let token = if config.randomize_tokens {
        let mut bytes = [0u8; 8];
        self.rng.fill_bytes(&mut bytes);
        Token(ArrayVec::from(bytes))
      } else {
        let bytes = config.token_seed
                          .to_be_bytes()
                          .into_iter()
                          .chain(millis_since_epoch(now).to_be_bytes())
                          .chain(self.tokens_issued.to_be_bytes())
                          .collect::<ArrayVec<[u8; 18]>>();
        Token::opaque(&bytes)
      };

      if !self.outbound.contains_key(&token) {
        return token;
      }
    }
  }

  fn retry_timer(&mut self, config: &Config, now: Instant<C>) -> RetryTimer<C> {
    RetryTimer::seeded(now,
                       config.msg.con.unacked_retry_strategy,
                       config.msg.con.max_transmissions(),
                       self.rng.next_u64())
  }

  /// Send the outbound's request (again) under a new message id
  fn transmit<E>(&mut self,
                 config: &Config,
                 now: Instant<C>,
                 out: &mut Outbound<C>,
                 effects: &mut Effects)
                 -> Result<(), What<E>> {
    let dest = out.req.dest();
    let id = self.next_id(dest);
    out.req.assign(id, out.token());

    let bytes = config.msg
                      .spec_version
                      .encode(out.req.msg())
                      .map_err(What::ToBytes)?;

    log::debug!(target: TARGET,
                "sending {} -> {}",
                logging::msg_summary(out.req.msg()),
                dest);

    self.by_id.insert((dest, id), out.token());
    out.sent_at = now;
    out.acked_at = None;
    out.retry = match out.req.ty() {
      | Type::Con => Some(self.retry_timer(config, now)),
      | _ => None,
    };
    out.bytes = bytes.clone();
    effects.push(Effect::Send(Addrd(bytes, dest)));

    Ok(())
  }

  fn release_ids(&mut self, token: Token) {
    self.by_id.retain(|_, t| *t != token);
  }

  fn register<E>(&mut self,
                 config: &Config,
                 now: Instant<C>,
                 mut req: Req,
                 effects: &mut Effects)
                 -> Result<Exchange, What<E>> {
    req.check().map_err(What::InvalidOption)?;

    let token = match req.token() {
      | Some(token) if self.outbound.contains_key(&token) => return Err(What::TokenInUse(token)),
      | Some(token) => token,
      | None => self.next_token(&config.msg, now),
    };
    req.set_token(token);

    let upload = match req.block1() {
      | Some(block) => Some(Upload::new(req.payload().to_vec(), block.size())),
      | None if Upload::needed(req.payload().len(), config.block.size()) => {
        Some(Upload::new(req.payload().to_vec(), config.block.size()))
      },
      | None => None,
    };

    if let Some(upload) = upload.as_ref() {
      log::debug!(target: TARGET,
                  "uploading {}b body in blocks of {}b",
                  upload.total_len(),
                  upload.current().0.size());
      load_block1(&mut req, upload).map_err(What::InvalidOption)?;
    }

    let observe = match req.observe_action() {
      | Some(ObserveAction::Register) => Some(ObserveRelation::new(req.clone(), config.observe)),
      | _ => None,
    };

    let exchange = Exchange::new(token);
    let mut out = Outbound::new(req, exchange.clone(), now);
    out.upload = upload;
    out.observe = observe;

    self.transmit(config, now, &mut out, effects)?;
    self.outbound.insert(token, out);

    Ok(exchange)
  }

  fn ping<E>(&mut self,
             config: &Config,
             now: Instant<C>,
             dest: SocketAddr,
             effects: &mut Effects)
             -> Result<Exchange, What<E>> {
    let id = self.next_id(dest);
    let msg = Message::ping(id);
    let bytes = config.msg
                      .spec_version
                      .encode(&msg)
                      .map_err(What::ToBytes)?;

    log::debug!(target: TARGET, "pinging {} (id {})", dest, id.0);

    let exchange = Exchange::new(Token::default());
    let retry = self.retry_timer(config, now);
    self.pings.insert((dest, id),
                      Ping { exchange: exchange.clone(),
                             bytes: bytes.clone(),
                             sent_at: now,
                             retry });
    effects.push(Effect::Send(Addrd(bytes, dest)));

    Ok(exchange)
  }

  /// Answer a message from a peer, remembering the answer
  /// in case the message is duplicated
  fn reply<E>(&mut self,
              config: &Config,
              now: Instant<C>,
              to: Addrd<Id>,
              reply: Message,
              effects: &mut Effects)
              -> Result<(), What<E>> {
    let bytes = config.msg
                      .spec_version
                      .encode(&reply)
                      .map_err(What::ToBytes)?;

    log::trace!(target: TARGET,
                "replying {} -> {}",
                logging::msg_summary(&reply),
                to.addr());

    effects.push(Effect::Send(Addrd(bytes.clone(), to.addr())));
    self.seen.insert((to.addr(), *to.data()),
                     Seen { at: now,
                            reply: Some(bytes) });
    Ok(())
  }

  fn remember(&mut self, now: Instant<C>, msg: Addrd<Id>) {
    self.seen.insert((msg.addr(), *msg.data()),
                     Seen { at: now,
                            reply: None });
  }

  fn recv<E>(&mut self,
             config: &Config,
             now: Instant<C>,
             msg: Addrd<Message>,
             effects: &mut Effects)
             -> Result<(), What<E>> {
    let id = msg.as_ref().map(|m| m.id);

    let ty = msg.data().ty;

    if msg.data().is_empty() {
      match ty {
        | Type::Con => {
          log::trace!(target: TARGET, "pinged by {}", msg.addr());
          let rst = msg.data().reset();
          self.reply(config, now, id, rst, effects)
        },
        | Type::Ack => {
          self.acked(now, msg, effects);
          Ok(())
        },
        | Type::Reset => {
          self.reset(now, msg, effects);
          Ok(())
        },
        | Type::Non => {
          log::trace!(target: TARGET, "ignoring empty NON from {}", msg.addr());
          Ok(())
        },
      }
    } else if msg.data().is_request() {
      log::debug!(target: TARGET,
                  "rejecting request {} <- {}",
                  logging::msg_summary(msg.data()),
                  msg.addr());
      match ty {
        | Type::Con => {
          let rst = msg.data().reset();
          self.reply(config, now, id, rst, effects)
        },
        | _ => Ok(()),
      }
    } else if msg.data().is_response() && ty != Type::Reset {
      self.response(config, now, msg, effects)
    } else {
      log::trace!(target: TARGET,
                  "ignoring {} <- {}",
                  logging::msg_summary(msg.data()),
                  msg.addr());
      Ok(())
    }
  }

  fn pong(&mut self, now: Instant<C>, msg: &Addrd<Message>, effects: &mut Effects) -> bool {
    match self.pings.remove(&(msg.addr(), msg.data().id)) {
      | Some(ping) => {
        let rtt = Milliseconds(millis_between(ping.sent_at, now));
        log::debug!(target: TARGET, "{} answered ping after {}ms", msg.addr(), rtt.0);
        let pong = Resp::new(msg.data().clone(), msg.addr(), rtt, true);
        effects.push(Effect::Deliver(ping.exchange, pong, None));
        true
      },
      | None => false,
    }
  }

  fn outbound_for_id(&mut self, msg: &Addrd<Message>) -> Option<&mut Outbound<C>> {
    let token = *self.by_id.get(&(msg.addr(), msg.data().id))?;
    self.outbound
        .get_mut(&token)
        .filter(|out| out.req.id() == Some(msg.data().id))
  }

  fn acked(&mut self, now: Instant<C>, msg: Addrd<Message>, effects: &mut Effects) {
    if let Some(out) = self.outbound_for_id(&msg) {
      if out.retry.take().is_some() {
        log::trace!(target: TARGET, "{} acked by {}", out.token(), msg.addr());
        out.acked_at = Some(now);
      } else {
        log::trace!(target: TARGET, "duplicate ACK from {}", msg.addr());
      }
      return;
    }

    if !self.pong(now, &msg, effects) {
      log::trace!(target: TARGET, "unexpected ACK from {}", msg.addr());
    }
  }

  fn reset(&mut self, now: Instant<C>, msg: Addrd<Message>, effects: &mut Effects) {
    let rejected = self.outbound_for_id(&msg)
                       .map(|out| out.token())
                       .and_then(|token| self.outbound.remove(&token));

    match rejected {
      | Some(out) => {
        log::debug!(target: TARGET,
                    "{} rejected by {}",
                    logging::msg_summary(out.req.msg()),
                    msg.addr());
        self.release_ids(out.token());
        effects.push(Effect::Fail(out.exchange, Failure::Rejected));
      },
      | None => {
        if !self.pong(now, &msg, effects) {
          log::trace!(target: TARGET, "unexpected RST from {}", msg.addr());
        }
      },
    }
  }

  fn response<E>(&mut self,
                 config: &Config,
                 now: Instant<C>,
                 msg: Addrd<Message>,
                 effects: &mut Effects)
                 -> Result<(), What<E>> {
    let id = msg.as_ref().map(|m| m.id);
    let Addrd(mut msg, src) = msg;

    if !msg.ty.answers_con() {
      if let Some(seen) = self.seen.get(&(src, msg.id)) {
        log::trace!(target: TARGET,
                    "duplicate {} <- {}",
                    logging::msg_summary(&msg),
                    src);
        if let Some(reply) = seen.reply.clone() {
          effects.push(Effect::Send(Addrd(reply, src)));
        }
        return Ok(());
      }
    }

    let token = msg.token;
    let mut out = match self.outbound.remove(&token) {
      | Some(out) if out.sent_from(src) && (msg.ty != Type::Ack || out.req.id() == Some(msg.id)) => {
        out
      },
      | other => {
        if let Some(out) = other {
          self.outbound.insert(token, out);
        }

        log::debug!(target: TARGET,
                    "unmatched {} <- {}",
                    logging::msg_summary(&msg),
                    src);
        return match msg.ty {
          | Type::Ack => Ok(()),
          | _ => self.reply(config, now, id, msg.reset(), effects),
        };
      },
    };

    if let Some(num) = msg.unrecognized_critical() {
      log::warn!(target: TARGET,
                 "rejecting {} <- {}: unrecognized critical option {}",
                 logging::msg_summary(&msg),
                 src,
                 num.0);
      if msg.ty != Type::Ack {
        self.reply(config, now, id, msg.reset(), effects)?;
      }
      self.release_ids(token);
      effects.push(Effect::Fail(out.exchange, Failure::Rejected));
      return Ok(());
    }

    let cancelled = out.exchange.is_closed()
                    || out.observe
                          .as_ref()
                          .map_or(false, ObserveRelation::is_cancelled);
    if cancelled {
      log::debug!(target: TARGET,
                  "{} is no longer wanted, releasing {}",
                  logging::msg_summary(&msg),
                  src);
      if msg.ty != Type::Ack {
        self.reply(config, now, id, msg.reset(), effects)?;
      }
      self.release_ids(token);
      return Ok(());
    }

    match msg.ty {
      | Type::Con => self.reply(config, now, id, msg.ack(), effects)?,
      | Type::Non => self.remember(now, id),
      | _ => (),
    }

    out.retry = None;
    if !out.req.is_multicast() {
      out.acked_at.get_or_insert(now);
    }
    let rtt = Milliseconds(millis_between(out.sent_at, now));

    if out.deregistering && msg.observe().is_some() {
      log::trace!(target: TARGET, "ignoring notification on deregistered {}", token);
      self.outbound.insert(token, out);
      return Ok(());
    }

    let continued = match (msg.block1(), out.upload.as_mut()) {
      | (Some(ack), Some(upload)) if msg.code == code::CONTINUE => upload.advance(ack),
      | _ => false,
    };
    if continued {
      if let Some(upload) = out.upload.as_ref() {
        load_block1(&mut out.req, upload).map_err(What::InvalidOption)?;
      }
      self.transmit(config, now, &mut out, effects)?;
      self.outbound.insert(token, out);
      return Ok(());
    }

    if let Some(block) = msg.block2().filter(|b| b.more() || b.num() > 0 || out.block2.is_some()) {
      // a notification's first block arriving mid-body: newer ones
      // replace the representation being assembled, older ones are stale
      let newer_body = match (out.block2.is_some(), out.block2_seq, msg.observe()) {
        | (true, Some(assembling), Some(seq)) if block.num() == 0 => Some(is_newer(seq, assembling)),
        | _ => None,
      };
      match newer_body {
        | Some(true) => {
          log::trace!(target: TARGET,
                      "{} restarting body at notification {:?}",
                      token,
                      msg.observe());
          out.block2 = None;
          out.block2_seq = None;
        },
        | Some(false) => {
          log::trace!(target: TARGET, "stale notification on {}", token);
          self.outbound.insert(token, out);
          return Ok(());
        },
        | None => (),
      }

      if out.block2.is_none() {
        let stale = match (out.observe.as_ref(), msg.observe()) {
          | (Some(rel), Some(seq)) => !rel.is_fresh(seq, now),
          | _ => false,
        };
        if stale {
          log::trace!(target: TARGET, "stale notification on {}", token);
          self.outbound.insert(token, out);
          return Ok(());
        }
        out.block2_seq = msg.observe();
      }

      let piece = out.block2
                     .get_or_insert_with(Assembler::default)
                     .push(block, &msg.payload.0);

      match piece {
        | Err(e) => {
          log::warn!(target: TARGET,
                     "{} got block {} out of order (expected offset {})",
                     token,
                     e.got.num(),
                     e.expected_offset);
          self.release_ids(token);
          effects.push(Effect::Fail(out.exchange, Failure::Rejected));
          return Ok(());
        },
        | Ok(Piece::Incomplete(next)) => {
          log::trace!(target: TARGET, "{} asking for block {}", token, next.num());
          out.req.set_block2(next).map_err(What::InvalidOption)?;
          out.req.remove_options(number::OBSERVE);
          if out.upload.take().is_some() {
            out.req.remove_options(number::BLOCK1);
            out.req.remove_options(number::SIZE1);
            out.req.set_payload(Vec::new());
          }
          self.transmit(config, now, &mut out, effects)?;
          self.outbound.insert(token, out);
          return Ok(());
        },
        | Ok(Piece::Complete(body)) => {
          out.block2 = None;
          msg.payload = Payload(body);
          msg.remove_options(number::BLOCK2);
          match out.block2_seq.take() {
            | Some(seq) => msg.set_observe(seq).map_err(What::InvalidOption)?,
            | None => {
              msg.remove_options(number::OBSERVE);
            },
          }
        },
      }
    }

    log::debug!(target: TARGET,
                "received {} <- {} after {}ms",
                logging::msg_summary(&msg),
                src,
                rtt.0);

    let seq = msg.observe();
    let accepted = out.observe
                      .as_mut()
                      .map(|rel| rel.notify(Resp::new(msg.clone(), src, rtt, seq.is_none()), now));

    match accepted {
      | Some(true) => {
        let resp = Resp::new(msg, src, rtt, seq.is_none());
        self.deliveries += 1;
        effects.push(Effect::Deliver(out.exchange.clone(), resp, Some(self.deliveries)));
        match seq {
          | Some(_) => {
            self.outbound.insert(token, out);
          },
          | None => self.release_ids(token),
        }
      },
      | Some(false) => {
        log::trace!(target: TARGET, "stale notification on {}", token);
        self.outbound.insert(token, out);
      },
      | None if out.req.is_multicast() => {
        out.delivered = true;
        effects.push(Effect::Deliver(out.exchange.clone(), Resp::new(msg, src, rtt, false), None));
        self.outbound.insert(token, out);
      },
      | None => {
        self.release_ids(token);
        effects.push(Effect::Deliver(out.exchange, Resp::new(msg, src, rtt, true), None));
      },
    }

    Ok(())
  }

  /// Advance the timers of one outbound request, yielding it
  /// back if it is still in flight
  fn tick<E>(&mut self,
             config: &Config,
             now: Instant<C>,
             mut out: Outbound<C>,
             effects: &mut Effects)
             -> Result<Option<Outbound<C>>, What<E>> {
    let lifetime = config.exchange_lifetime_millis();

    if out.exchange.is_closed() || out.cancelled_at.is_some() {
      let keep = match (out.observe.is_some(), out.cancelled_at) {
        | (true, None) => {
          log::debug!(target: TARGET,
                      "observation {} cancelled, next notification will be reset",
                      out.token());
          if let Some(rel) = out.observe.as_mut() {
            rel.cancel();
          }
          out.retry = None;
          out.cancelled_at = Some(now);
          true
        },
        | (true, Some(at)) => millis_between(at, now) < lifetime,
        | _ => false,
      };

      if !keep {
        log::trace!(target: TARGET, "forgetting {}", out.token());
        return Ok(None);
      }
      return Ok(Some(out));
    }

    let due = out.retry
                 .as_mut()
                 .map(|retry| (retry.what_should_i_do(now), retry.attempts()));

    match due {
      | Some((Ok(YouShould::Retry), attempts)) => {
        log::debug!(target: TARGET,
                    "retransmitting {} (transmission {})",
                    logging::msg_summary(out.req.msg()),
                    attempts.0);
        out.sent_at = now;
        effects.push(Effect::Send(Addrd(out.bytes.clone(), out.req.dest())));
        return Ok(Some(out));
      },
      | Some((Ok(YouShould::Cry), attempts)) => {
        log::debug!(target: TARGET,
                    "{} never acknowledged after {} transmissions",
                    logging::msg_summary(out.req.msg()),
                    attempts.0);
        effects.push(Effect::Fail(out.exchange, Failure::TimedOut));
        return Ok(None);
      },
      | Some((Err(_), _)) => return Ok(Some(out)),
      | None => (),
    }

    let reregister = out.observe
                        .as_ref()
                        .map_or(false, |rel| rel.reregistration_due(now));
    if reregister {
      if let Some(req) = out.observe.as_mut().map(ObserveRelation::reregister) {
        log::debug!(target: TARGET, "re-registering observation {}", out.token());
        out.req = req;
        out.block2 = None;
        out.block2_seq = None;
        self.transmit(config, now, &mut out, effects)?;
        return Ok(Some(out));
      }
    }

    let observing = out.observe
                       .as_ref()
                       .map_or(false, |rel| rel.current().is_some());
    if observing {
      return Ok(Some(out));
    }

    let (since, limit) = match out.acked_at {
      | Some(at) if !out.req.is_multicast() => (at, lifetime),
      | _ if out.req.ty() == Type::Non => (out.sent_at, config.msg.non.response_timeout.0),
      | _ => return Ok(Some(out)),
    };

    if millis_between(since, now) < limit {
      return Ok(Some(out));
    }

    if out.delivered {
      log::trace!(target: TARGET, "done collecting responses to {}", out.token());
      effects.push(Effect::Close(out.exchange));
    } else {
      log::debug!(target: TARGET,
                  "no response to {} after {}ms",
                  logging::msg_summary(out.req.msg()),
                  limit);
      effects.push(Effect::Fail(out.exchange, Failure::TimedOut));
    }

    Ok(None)
  }

  fn timers<E>(&mut self,
               config: &Config,
               now: Instant<C>,
               effects: &mut Effects)
               -> Result<(), What<E>> {
    let tokens = self.outbound.keys().copied().collect::<Vec<_>>();
    for token in tokens {
      if let Some(out) = self.outbound.remove(&token) {
        match self.tick(config, now, out, effects)? {
          | Some(out) => {
            self.outbound.insert(token, out);
          },
          | None => self.release_ids(token),
        }
      }
    }

    self.pings.retain(|_, ping| !ping.exchange.is_closed());

    let pings = self.pings.keys().copied().collect::<Vec<_>>();
    for key in pings {
      let due = match self.pings.get_mut(&key) {
        | Some(ping) => ping.retry.what_should_i_do(now),
        | None => continue,
      };

      match due {
        | Ok(YouShould::Retry) => {
          if let Some(ping) = self.pings.get_mut(&key) {
            ping.sent_at = now;
            effects.push(Effect::Send(Addrd(ping.bytes.clone(), key.0)));
          }
        },
        | Ok(YouShould::Cry) => {
          if let Some(ping) = self.pings.remove(&key) {
            log::debug!(target: TARGET, "{} never answered ping", key.0);
            effects.push(Effect::Fail(ping.exchange, Failure::TimedOut));
          }
        },
        | Err(_) => (),
      }
    }

    let lifetime = config.exchange_lifetime_millis();
    self.seen
        .retain(|_, seen| millis_between(seen.at, now) < lifetime);

    Ok(())
  }

  /// Find the outbound request behind `exchange`, removing it from the registry
  fn take(&mut self, exchange: &Exchange) -> Option<Outbound<C>> {
    match self.outbound.remove(&exchange.token()) {
      | Some(out) if out.exchange.same_as(exchange) => Some(out),
      | Some(other) => {
        self.outbound.insert(other.token(), other);
        None
      },
      | None => None,
    }
  }
}

/// A CoAP client endpoint.
///
/// Sends requests over a [`Socket`], and tracks each of them through to its
/// outcome: retransmitting unacknowledged CONs, matching ACKs, RSTs and responses,
/// dropping duplicates, assembling Block2 bodies, uploading Block1 bodies and
/// ordering the notifications of observed resources.
///
/// The endpoint never blocks or spawns threads. Something has to call
/// [`Endpoint::poll`] regularly (see [`Driver`](crate::std::Driver)); every method
/// takes `&self`, so one endpoint can be shared by any number of threads.
/// Callbacks registered on an [`Exchange`] run on the thread that polled,
/// after the endpoint has released its internal lock. A notification
/// overtaken by a newer one polled on another thread is dropped, so
/// exchanges only ever see notifications in the order they were accepted.
///
/// ```
/// use ribbit::config::Config;
/// use ribbit::core::Endpoint;
/// use ribbit::req::Req;
/// use ribbit::resp::{code, Resp};
/// use ribbit::test::{peer, ClockMock, SockMock};
/// use ribbit::time::Timeout;
///
/// let sock = SockMock::new();
/// let endpoint = Endpoint::new(Config::default(), ClockMock::new(), sock.clone());
///
/// let exchange = endpoint.send(Req::get(peer(5683), "hello")).unwrap();
///
/// // the request went out; pretend the server answered it
/// let sent = sock.take_sent().remove(0).unwrap();
/// let mut resp = Resp::for_request(&sent, peer(5683)).unwrap();
/// resp.set_payload("hi");
/// sock.push_msg(resp.msg(), peer(5683));
///
/// endpoint.poll().unwrap();
/// let resp = exchange.wait(Timeout::Never).unwrap();
/// assert_eq!(resp.code(), code::CONTENT);
/// assert_eq!(resp.payload_str(), Some("hi"));
/// ```
pub struct Endpoint<C: Clock, S: Socket> {
  sock: S,
  clock: C,
  config: Config,
  state: Mutex<Registry<C>>,
}

impl<C: Clock, S: Socket> fmt::Debug for Endpoint<C, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Endpoint")
     .field("local_addr", &self.sock.local_addr())
     .field("config", &self.config)
     .field("in_flight", &self.in_flight())
     .finish()
  }
}

impl<C: Clock, S: Socket> Endpoint<C, S> {
  /// Create an endpoint talking over `sock`
  pub fn new(config: Config, clock: C, sock: S) -> Self {
    Self { state: Mutex::new(Registry::new(&config)),
           sock,
           clock,
           config }
  }

  /// The endpoint's configuration
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The socket the endpoint talks over
  pub fn socket(&self) -> &S {
    &self.sock
  }

  /// The endpoint's clock
  pub fn clock(&self) -> &C {
    &self.clock
  }

  /// Address the endpoint's socket is bound to
  pub fn local_addr(&self) -> SocketAddr {
    self.sock.local_addr()
  }

  /// Join a multicast group, so that responses to multicast
  /// requests sent to the group's address are received
  pub fn join_multicast(&self, group: IpAddr) -> Result<(), Error<S::Error>> {
    self.sock
        .join_multicast(group)
        .map_err(|e| When::None.what(What::SockError(e)))
  }

  /// Number of requests still in flight (including pings,
  /// and observations that have not ended)
  pub fn in_flight(&self) -> usize {
    let reg = self.registry();
    reg.outbound.len() + reg.pings.len()
  }

  fn registry(&self) -> MutexGuard<'_, Registry<C>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn now(&self, when: When) -> Result<Instant<C>, Error<S::Error>> {
    self.clock
        .try_now()
        .map_err(|_| when.what(What::ClockError))
  }

  fn perform(&self, when: When, effects: Effects) -> Result<(), Error<S::Error>> {
    let mut result = Ok(());

    for effect in effects {
      match effect {
        | Effect::Send(Addrd(bytes, addr)) => match self.sock.send(Addrd(bytes.as_slice(), addr)) {
          | Ok(()) => (),
          | Err(nb::Error::WouldBlock) => {
            log::warn!(target: TARGET, "socket busy, dropped {}b -> {}", bytes.len(), addr)
          },
          | Err(nb::Error::Other(e)) => {
            log::error!(target: TARGET, "sending {}b -> {} failed: {:?}", bytes.len(), addr, e);
            if result.is_ok() {
              result = Err(when.what(What::SockError(e)));
            }
          },
        },
        | Effect::Deliver(exchange, resp, None) => {
          exchange.deliver(resp);
        },
        | Effect::Deliver(exchange, resp, Some(stamp)) => {
          exchange.deliver_in_order(resp, stamp);
        },
        | Effect::Fail(exchange, failure) => {
          exchange.fail(failure);
        },
        | Effect::Close(exchange) => {
          exchange.close();
        },
        | Effect::Supersede(old, new) => old.supersede(&new),
      }
    }

    result
  }

  /// Run `f` against the registry, then perform whatever it decided to do
  fn with_registry<R>(&self,
                      when: When,
                      f: impl FnOnce(&mut Registry<C>, Instant<C>, &mut Effects) -> Result<R, What<S::Error>>)
                      -> Result<R, Error<S::Error>> {
    let now = self.now(when)?;
    let mut effects = Vec::new();

    let mut reg = self.registry();
    let result = f(&mut reg, now, &mut effects).map_err(|what| when.what(what));
    drop(reg);

    let performed = self.perform(when, effects);

    result.and_then(|r| performed.map(|_| r))
  }

  /// Send a request.
  ///
  /// The endpoint assigns the request a message id and (unless one was set
  /// explicitly) a token. Bodies larger than the configured block size are
  /// uploaded block by block, and requests with Observe=0 start an
  /// [observation](crate::observe).
  pub fn send(&self, req: Req) -> Result<Exchange, Error<S::Error>> {
    let when = When::SendingMessage(Some(req.dest()),
                                    req.id().unwrap_or_default(),
                                    req.token().unwrap_or_default());
    let now = self.now(when)?;
    let mut effects = Vec::new();

    let exchange = self.registry()
                       .register(&self.config, now, req, &mut effects)
                       .map_err(|what| when.what(what))?;

    match self.perform(when, effects) {
      | Ok(()) => Ok(exchange),
      | Err(e) => {
        // the request never made it out
        let mut reg = self.registry();
        if let Some(out) = reg.take(&exchange) {
          reg.release_ids(out.token());
        }
        Err(e)
      },
    }
  }

  /// Register interest in a resource; see [`observe`](crate::observe).
  ///
  /// Every fresh notification is delivered to the exchange
  /// (see [`Exchange::next_notification`] and [`Exchange::on_response`]).
  pub fn observe(&self, mut req: Req) -> Result<Exchange, Error<S::Error>> {
    req.set_observe_action(ObserveAction::Register)
       .map_err(|e| When::None.what(What::InvalidOption(e)))?;
    self.send(req)
  }

  /// Ask `dest` which resources it has (`GET /.well-known/core`),
  /// optionally filtered by a query like `"rt=temperature"`.
  ///
  /// Parse the response with [`link_format::parse`](crate::link_format::parse).
  pub fn discover(&self, dest: SocketAddr, query: Option<&str>) -> Result<Exchange, Error<S::Error>> {
    let mut builder = ReqBuilder::get(dest, WELL_KNOWN_CORE).accept(ContentFormat::LinkFormat);
    if let Some(query) = query {
      builder = builder.query(query);
    }

    let req = builder.build()
                     .map_err(|e| When::None.what(What::InvalidOption(e)))?;

    self.send(req)
  }

  /// Check that `dest` is alive by sending a CoAP ping (an Empty CON).
  ///
  /// The exchange is resolved with the peer's (empty) Reset, or fails with
  /// [`Failure::TimedOut`] once it has been retransmitted as often as a request would be.
  pub fn ping(&self, dest: SocketAddr) -> Result<Exchange, Error<S::Error>> {
    let config = self.config;
    self.with_registry(When::SendingMessage(Some(dest), Id(0), Token::default()),
                       |reg, now, effects| reg.ping(&config, now, dest, effects))
  }

  /// Stop waiting for a response.
  ///
  /// Retransmission stops immediately and the exchange fails with [`Failure::Cancelled`].
  /// An observation is cancelled reactively: the server is told to forget us
  /// (with a Reset) when its next notification arrives.
  pub fn cancel(&self, exchange: &Exchange) -> Result<(), Error<S::Error>> {
    let found = self.with_registry(When::None, |reg, now, _| {
                      let ping = reg.pings
                                    .iter()
                                    .find(|(_, p)| p.exchange.same_as(exchange))
                                    .map(|(k, _)| *k);
                      if let Some(key) = ping {
                        reg.pings.remove(&key);
                        return Ok(true);
                      }

                      Ok(match reg.take(exchange) {
                           | Some(mut out) => {
                             let token = out.token();
                             if let Some(rel) = out.observe.as_mut() {
                               rel.cancel();
                             }

                             if out.observe.is_some() {
                               out.retry = None;
                               out.cancelled_at = Some(now);
                               reg.outbound.insert(token, out);
                             } else {
                               reg.release_ids(token);
                             }
                             true
                           },
                           | None => false,
                         })
                    })?;

    exchange.cancel();

    if found {
      Ok(())
    } else {
      Err(When::None.what(What::NotFound))
    }
  }

  /// Cancel an observation by asking the server to forget us:
  /// a GET with Observe=1 and the observation's token.
  ///
  /// The observation's exchange fails with [`Failure::Cancelled`]; the yielded
  /// exchange tracks the deregistration request itself.
  pub fn cancel_proactively(&self, exchange: &Exchange) -> Result<Exchange, Error<S::Error>> {
    let config = self.config;

    self.with_registry(When::None, |reg, now, effects| {
          let out = match reg.take(exchange) {
            | Some(out) if out.observe.is_some() => out,
            | Some(out) => {
              reg.outbound.insert(out.token(), out);
              return Err(What::NotFound);
            },
            | None => return Err(What::NotFound),
          };

          let dereg = out.observe
                         .as_ref()
                         .map(ObserveRelation::deregister_request)
                         .unwrap_or_else(|| Ok(out.req.clone()))
                         .map_err(What::InvalidOption)?;

          log::debug!(target: TARGET, "deregistering observation {}", out.token());

          let successor = Exchange::new(out.token());
          let mut next = Outbound::new(dereg, successor.clone(), now);
          next.deregistering = true;

          reg.release_ids(out.token());
          effects.push(Effect::Fail(out.exchange, Failure::Cancelled));

          reg.transmit(&config, now, &mut next, effects)?;
          reg.outbound.insert(next.token(), next);

          Ok(successor)
        })
  }

  /// Re-register an observation now, with a fresh notification orderer.
  ///
  /// Yields a new exchange that receives the observation's notifications
  /// from now on. Callbacks registered on the old exchange move to the new
  /// one, and the old exchange is closed.
  pub fn reregister(&self, exchange: &Exchange) -> Result<Exchange, Error<S::Error>> {
    let config = self.config;

    self.with_registry(When::None, |reg, now, effects| {
          let mut out = match reg.take(exchange) {
            | Some(out) if out.observe.as_ref().map_or(false, |rel| !rel.is_cancelled()) => out,
            | Some(out) => {
              reg.outbound.insert(out.token(), out);
              return Err(What::NotFound);
            },
            | None => return Err(What::NotFound),
          };

          if let Some(req) = out.observe.as_mut().map(ObserveRelation::reregister) {
            out.req = req;
          }
          out.block2 = None;
          out.block2_seq = None;

          let successor = Exchange::new(out.token());
          let old = std::mem::replace(&mut out.exchange, successor.clone());

          log::debug!(target: TARGET, "re-registering observation {}", out.token());
          reg.transmit(&config, now, &mut out, effects)?;
          reg.outbound.insert(out.token(), out);
          effects.push(Effect::Supersede(old, successor.clone()));

          Ok(successor)
        })
  }

  /// Process a datagram received by someone other than the endpoint.
  ///
  /// Datagrams that do not decode are logged and dropped.
  pub fn handle_dgram(&self, dgram: Addrd<Vec<u8>>) -> Result<(), Error<S::Error>> {
    let msg = match self.config.msg.spec_version.decode(dgram.data()) {
      | Ok(msg) => Addrd(msg, dgram.addr()),
      | Err(e) => {
        log::warn!(target: TARGET,
                   "dropping {}b from {}: {:?}",
                   dgram.data().len(),
                   dgram.addr(),
                   e);
        return Ok(());
      },
    };

    log::trace!(target: TARGET,
                "recvd {} <- {}",
                logging::msg_summary(msg.data()),
                msg.addr());

    let config = self.config;
    self.with_registry(When::Polling, |reg, now, effects| reg.recv(&config, now, msg, effects))
  }

  /// Retransmit, time out and re-register whatever is due
  pub fn poll_timers(&self) -> Result<(), Error<S::Error>> {
    let config = self.config;
    self.with_registry(When::Polling, |reg, now, effects| reg.timers(&config, now, effects))
  }

  /// Process every datagram waiting on the socket, then [`poll_timers`](Endpoint::poll_timers)
  pub fn poll(&self) -> Result<(), Error<S::Error>> {
    while let Some(dgram) = self.sock
                                .poll(self.config.msg.max_dgram_size)
                                .map_err(|e| When::Polling.what(What::SockError(e)))?
    {
      self.handle_dgram(dgram)?;
    }

    self.poll_timers()
  }
}
