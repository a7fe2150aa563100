//! End-to-end coverage of spec.md §8's negotiation scenarios (S1–S6),
//! driven through [`ControlLayer`] rather than unit-testing instances
//! directly, so the CCP-visits-absent-options/LCP-doesn't dispatch
//! asymmetry and the outbound-record assembly are exercised too.

use ppp_optneg::driver::{ControlLayer, ResponseCode};
use ppp_optneg::option::ControlProtocol;
use ppp_optneg::registry::HandlerRegistry;
use ppp_optneg::{accm, mppe, Event, StaticConfig};
use ppp_optneg::testutil::MockNet;

fn ccp_layer(cfg: &StaticConfig) -> ControlLayer {
    let mut reg = HandlerRegistry::new();
    reg.register(&mppe::HANDLER);
    ControlLayer::new(ControlProtocol::Ccp, &reg, cfg)
}

fn lcp_layer(cfg: &StaticConfig) -> ControlLayer {
    let mut reg = HandlerRegistry::new();
    reg.register(&accm::HANDLER);
    ControlLayer::new(ControlProtocol::Lcp, &reg, cfg)
}

const MAX_OUT: usize = 48;

/// S1: Require+128, peer offers H|S — ACK, kernel key install called with a
/// 16-byte key and bits H|S, MTU decremented once. The install happens
/// inline at the ACK tail of `recv_conf_req`, not at a later apply-up step
/// (the original has no `opt_up` hook for MPPE at all).
#[test]
fn s1_require_128_peer_offers_h_and_s() {
    let mut cfg = StaticConfig::new();
    cfg.set("ppp", "mppe", "require");
    cfg.set("ppp", "mppe-128", "1");
    let mut layer = ccp_layer(&cfg);
    let net = MockNet::new(1500);

    // payload 0x01000040 = MPPE_H | MPPE_S
    let pkt = [mppe::CI_MPPE, 6, 0x01, 0x00, 0x00, 0x40];
    let mut out = [0u8; MAX_OUT];
    let (code, len) = layer.dispatch_configure_request(&pkt, &net, &mut out);
    assert_eq!(code, ResponseCode::Ack);
    assert_eq!(&out[..len], &pkt[..]);

    // Dispatching the Configure-Request already installed the send-side key
    // (PPPIOCSCOMPRESS) and decremented the MTU exactly once via the
    // sock_ioctl pair.
    let calls = net.calls.borrow();
    let compress_calls = calls
        .iter()
        .filter(|c| matches!(c, ppp_optneg::testutil::Call::PppIoctl { request, .. } if *request == ppp_optneg::net::ioctl::PPPIOCSCOMPRESS))
        .count();
    assert_eq!(compress_calls, 1);
    assert_eq!(*net.mtu.borrow(), 1500 - mppe::MPPE_PAD);
    drop(calls);

    // apply_up no longer does anything for MPPE; it must not install again.
    layer.apply_up(&net).unwrap();
    let compress_calls = net
        .calls
        .borrow()
        .iter()
        .filter(|c| matches!(c, ppp_optneg::testutil::Call::PppIoctl { request, .. } if *request == ppp_optneg::net::ioctl::PPPIOCSCOMPRESS))
        .count();
    assert_eq!(compress_calls, 1);
}

/// S2: Require, peer says nothing about MPPE at all — CCP must still visit
/// the MPPE instance (it's the only registered CCP option) and NAK.
#[test]
fn s2_require_peer_offers_none() {
    let mut cfg = StaticConfig::new();
    cfg.set("ppp", "mppe", "require");
    let mut layer = ccp_layer(&cfg);
    let net = MockNet::new(1500);

    let mut out = [0u8; MAX_OUT];
    let (code, len) = layer.dispatch_configure_request(&[], &net, &mut out);
    assert_eq!(code, ResponseCode::Nak);
    assert_eq!(out[0], mppe::CI_MPPE);
    assert_eq!(len, 6);
}

/// S5: ACCM allow, peer proposes 0xffffffff — ACK, and on apply-up both
/// ioctls fire on unit and channel fds; ENOTTY on either is not fatal.
#[test]
fn s5_accm_allow_enables_map() {
    let mut cfg = StaticConfig::new();
    cfg.set("ppp", "accm", "allow");
    let mut layer = lcp_layer(&cfg);
    let net = MockNet {
        asyncmap_errno: Some(libc::ENOTTY),
        ..MockNet::new(1500)
    };

    let pkt = [accm::CI_ASYNCMAP, 6, 0xff, 0xff, 0xff, 0xff];
    let mut out = [0u8; MAX_OUT];
    let (code, len) = layer.dispatch_configure_request(&pkt, &net, &mut out);
    assert_eq!(code, ResponseCode::Ack);
    assert_eq!(&out[..len], &pkt[..]);

    assert!(layer.apply_up(&net).is_ok());
}

/// S6: ACCM deny, peer proposes anything — REJ, no matter the payload.
#[test]
fn s6_accm_deny_rejects() {
    let cfg = StaticConfig::new();
    let mut layer = lcp_layer(&cfg);
    let net = MockNet::new(1500);

    let pkt = [accm::CI_ASYNCMAP, 6, 0x00, 0x00, 0x00, 0x00];
    let mut out = [0u8; MAX_OUT];
    let (code, _) = layer.dispatch_configure_request(&pkt, &net, &mut out);
    assert_eq!(code, ResponseCode::Rej);
}

/// An unregistered LCP option code in the peer's Configure-Request is
/// rejected outright — LCP never visits absent options, but it also never
/// invents a verdict for a code with no handler.
#[test]
fn lcp_rejects_option_with_no_handler() {
    let cfg = StaticConfig::new();
    let mut layer = lcp_layer(&cfg);
    let net = MockNet::new(1500);

    let pkt = [0x99u8, 4, 0x01, 0x02];
    let mut out = [0u8; MAX_OUT];
    let (code, len) = layer.dispatch_configure_request(&pkt, &net, &mut out);
    assert_eq!(code, ResponseCode::Rej);
    assert_eq!(&out[..len], &pkt[..]);
}

/// Key material delivered via the event bus before the peer's
/// Configure-Request arrives reaches the kernel key install at the ACK tail
/// of `recv_conf_req` (spec §4.G "Key event handler"; §9 open question on
/// zero-initialized keys is the complementary case — this is the "keys
/// arrived in time" path).
#[test]
fn mppe_keys_event_reaches_kernel_key_install() {
    let mut cfg = StaticConfig::new();
    cfg.set("ppp", "mppe", "require");
    cfg.set("ppp", "mppe-128", "1");
    let mut layer = ccp_layer(&cfg);
    let net = MockNet::new(1500);

    layer.dispatch_event(&Event::MppeKeys {
        recv_key: [0; 16],
        send_key: [0xab; 16],
        policy: -1,
        ty: 0x04,
    });

    let pkt = [mppe::CI_MPPE, 6, 0x01, 0x00, 0x00, 0x40];
    let mut out = [0u8; MAX_OUT];
    layer.dispatch_configure_request(&pkt, &net, &mut out);

    let calls = net.calls.borrow();
    let key_bytes = calls.iter().find_map(|c| match c {
        ppp_optneg::testutil::Call::PppIoctl { request, bytes, .. }
            if *request == ppp_optneg::net::ioctl::PPPIOCSCOMPRESS =>
        {
            Some(bytes.clone())
        }
        _ => None,
    });
    let bytes = key_bytes.expect("PPPIOCSCOMPRESS should have been called");
    assert_eq!(&bytes[6..6 + 16], &[0xabu8; 16][..]);
}

/// The MTU is decremented at most once across repeated Configure-Request
/// dispatches (spec invariant 4's "first enable" guard), even though each
/// ACK re-installs the send key.
#[test]
fn mtu_decrement_runs_at_most_once_across_repeated_installs() {
    let mut cfg = StaticConfig::new();
    cfg.set("ppp", "mppe", "require");
    let mut layer = ccp_layer(&cfg);
    let net = MockNet::new(1500);

    let pkt = [mppe::CI_MPPE, 6, 0x01, 0x00, 0x00, 0x40];
    let mut out = [0u8; MAX_OUT];
    layer.dispatch_configure_request(&pkt, &net, &mut out);
    layer.dispatch_configure_request(&pkt, &net, &mut out);

    assert_eq!(*net.mtu.borrow(), 1500 - mppe::MPPE_PAD);

    layer.apply_up(&net).unwrap();
    layer.apply_up(&net).unwrap();
    assert_eq!(*net.mtu.borrow(), 1500 - mppe::MPPE_PAD);
}
