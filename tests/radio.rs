use bt_hci::param::{BdAddr, ConnHandle, DisconnectReason};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{Duration, Instant, Timer};
use trouble_radio::ad_structure::AdStructure;
use trouble_radio::advertise::{encode, AdvConfig, AdvType, AppPayload, Framing, ScanResponseConfig};
use trouble_radio::advertiser::AdvertiserPhase;
use trouble_radio::config::{CONN_PARAMS_MAX_RETRY, CONN_PARAMS_RETRY_BACKOFF_MS, EVENT_QUEUE_SIZE};
use trouble_radio::connection::ConnPreset;
use trouble_radio::event::{CommEvent, RadioEvent};
use trouble_radio::gatt_link::LinkPhase;
use trouble_radio::phy::{ChannelMask, Phy, PhyPair};
use trouble_radio::radio::{Acquisition, RadioOwnership, RadioRole};
use trouble_radio::{Error, RadioConfig, RadioContext, RadioError};

mod common;
use common::{init_logger, Op, ScriptedController};

type Context = RadioContext<NoopRawMutex, ScriptedController>;

fn context() -> Context {
    init_logger();
    RadioContext::new(ScriptedController::new(), RadioConfig::default())
}

fn drain(ctx: &Context) -> Vec<CommEvent> {
    std::iter::from_fn(|| ctx.try_next_event()).collect()
}

#[test]
fn broadcast_three_bytes() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::new(true, true, true)).unwrap();
    adv.set_tx_interval(1010).unwrap();
    adv.set_type(AdvType::NonConnNonScan);
    adv.send(&[0x01, 0x02, 0x03]).unwrap();

    let configured = ctx.controller().configured();
    assert_eq!(configured.len(), 1);
    let descriptor = &configured[0];
    assert_eq!(descriptor.framing, Framing::Legacy);
    assert_eq!(descriptor.interval, Duration::from_millis(1010));
    assert_eq!(descriptor.channel_mask, ChannelMask::ALL);

    let ads: Vec<_> = AdStructure::decode(&descriptor.adv_payload)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        ads,
        vec![
            AdStructure::Flags(0x06),
            AdStructure::ManufacturerSpecificData {
                company_identifier: 0xffff,
                payload: &[0x01, 0x02, 0x03],
            },
        ]
    );
    assert_eq!(adv.state(), AdvertiserPhase::Advertising);

    ctx.dispatch(RadioEvent::AdvSetTerminated);
    assert_eq!(drain(&ctx), vec![CommEvent::Sent]);
    assert_eq!(adv.state(), AdvertiserPhase::Idle);
}

#[test]
fn advertisements_go_out_in_order() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    adv.set_manufacturer_id(0x0499);
    for tag in 1..=4u8 {
        adv.send(&[tag]).unwrap();
    }
    for _ in 0..4 {
        ctx.dispatch(RadioEvent::AdvSetTerminated);
    }

    let tags: Vec<u8> = ctx
        .controller()
        .configured()
        .iter()
        .map(|d| *d.adv_payload.last().unwrap())
        .collect();
    assert_eq!(tags, vec![1, 2, 3, 4]);
    assert_eq!(drain(&ctx), vec![CommEvent::Sent; 4]);
}

#[test]
fn queue_backpressure() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    // One on air plus a full queue.
    for tag in 0..=trouble_radio::config::ADV_QUEUE_SIZE as u8 {
        adv.send(&[tag]).unwrap();
    }
    let err = adv.send(&[0xff]).unwrap_err();
    assert_eq!(err, Error::ResourceExhausted);
}

#[test]
fn refused_set_moves_on() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    ctx.controller().refuse_start_adv(1);
    adv.send(&[1]).unwrap();
    assert_eq!(adv.state(), AdvertiserPhase::Idle);
    adv.send(&[2]).unwrap();
    assert_eq!(adv.state(), AdvertiserPhase::Advertising);
}

#[test]
fn legacy_frame_limit() {
    let data = [0x5a; 25];
    let config = AdvConfig::default();

    let descriptor = encode(&AppPayload::new(&data), &config).unwrap();
    assert_eq!(descriptor.framing, Framing::Extended);

    let config = AdvConfig {
        adv_type: AdvType::ConnScan,
        manufacturer_id: 0,
        scan_response: ScanResponseConfig {
            name: "ABCDEFGHIJKLMNOPQRSTUVWXYZ01",
            service_uuid: None,
        },
        ..AdvConfig::default()
    };
    let err = encode(&AppPayload::new(&[]), &config).unwrap_err();
    assert_eq!(Error::from(err), Error::DataTooLarge);

    let ctx = context();
    let mut adv = ctx.advertiser();
    assert_eq!(
        adv.configure_scan_response("ABCDEFGHIJKLMNOPQRSTUVWXYZ01", true),
        Err(Error::DataTooLarge)
    );
}

#[test]
fn manufacturer_data_round_trip() {
    let config = AdvConfig {
        manufacturer_id: 0x0499,
        ..AdvConfig::default()
    };
    for len in [0, 1, 13, 24] {
        let data: Vec<u8> = (0..len as u8).collect();
        let descriptor = encode(&AppPayload::new(&data), &config).unwrap();
        assert_eq!(descriptor.framing, Framing::Legacy);
        let parsed = AdStructure::decode(&descriptor.adv_payload)
            .find_map(|ad| match ad {
                Ok(AdStructure::ManufacturerSpecificData {
                    company_identifier: 0x0499,
                    payload,
                }) => Some(payload.to_vec()),
                _ => None,
            })
            .unwrap();
        assert_eq!(parsed, data);
    }
}

#[test]
fn radio_has_one_owner() {
    let controller = ScriptedController::new();
    let mut ownership = RadioOwnership::new();
    assert_eq!(
        ownership.acquire(RadioRole::Advertising, &controller, Phy::Le1M).unwrap(),
        Acquisition::BroughtUp
    );
    assert_eq!(
        ownership
            .acquire(RadioRole::Gatt, &controller, Phy::Le1M)
            .unwrap_err(),
        Error::AlreadyOwned
    );
    assert_eq!(
        ownership.release(RadioRole::Gatt, &controller).unwrap_err(),
        Error::Forbidden
    );
    ownership.release(RadioRole::Advertising, &controller).unwrap();
    assert!(!ownership.is_owned());
    assert_eq!(controller.ops(), vec![Op::Enable(Phy::Le1M), Op::Disable]);
}

#[test]
fn advertiser_and_scanner_stop_anywhere() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    let mut scanner = ctx.scanner();

    adv.stop();
    scanner.stop().unwrap();

    adv.init(ChannelMask::ALL).unwrap();
    adv.stop();
    adv.send(&[1]).unwrap();
    adv.send(&[2]).unwrap();
    adv.stop();
    adv.stop();
    assert_eq!(adv.state(), AdvertiserPhase::Idle);

    scanner.start(1000, 100).unwrap();
    scanner.stop().unwrap();
    scanner.stop().unwrap();
    assert!(!scanner.is_scanning());

    let controller = ctx.controller();
    assert_eq!(controller.count(|op| matches!(op, Op::StopAdv)), 1);
    assert_eq!(controller.count(|op| matches!(op, Op::StopScan)), 1);
}

#[tokio::test]
async fn scan_times_out_on_its_own() {
    let ctx = context();
    ctx.advertiser().init(ChannelMask::ALL).unwrap();
    let mut scanner = ctx.scanner();
    let params = scanner.start(1000, 100).unwrap();
    assert_eq!(params.timeout, Duration::from_millis(3000));
    assert_eq!(
        scanner.scan_window(),
        Some((Duration::from_millis(1000), Duration::from_millis(100)))
    );

    ctx.dispatch(RadioEvent::ScanTimeout);
    assert_eq!(ctx.next_event().await, CommEvent::Timeout);
    assert!(!scanner.is_scanning());
    assert_eq!(ctx.controller().count(|op| matches!(op, Op::StopScan)), 0);
}

#[test]
fn gives_up_after_max_retry() {
    let ctx = context();
    let handle = ConnHandle::new(1);
    let mut link = ctx.gatt_link();
    link.init().unwrap();
    ctx.dispatch(RadioEvent::Connected { handle });
    assert!(link.is_connected());
    assert_eq!(drain(&ctx), vec![CommEvent::Connected(handle)]);

    ctx.controller().refuse_conn_params(true);
    link.request_params(ConnPreset::Turbo, 0).unwrap();
    assert_eq!(link.phase(), LinkPhase::ParamsPending { retry: 1 });

    let backoff = Duration::from_millis(CONN_PARAMS_RETRY_BACKOFF_MS);
    let start = Instant::now();
    for step in 1..=CONN_PARAMS_MAX_RETRY as u64 + 2 {
        ctx.process_timers(start + backoff * step as u32);
    }

    let disconnects = ctx.controller().count(|op| {
        matches!(
            op,
            Op::Disconnect(h, DisconnectReason::UnacceptableConnParameters) if *h == handle
        )
    });
    assert_eq!(disconnects, 1);
    assert_eq!(
        ctx.controller().count(|op| matches!(op, Op::UpdateConnParams(..))),
        CONN_PARAMS_MAX_RETRY + 1
    );
    assert_eq!(link.phase(), LinkPhase::Disconnecting);
    assert_eq!(ctx.next_deadline(), None);

    ctx.dispatch(RadioEvent::Disconnected { handle, reason: 0x3b });
    assert_eq!(link.phase(), LinkPhase::Disconnected);
    assert_eq!(
        link.request_params(ConnPreset::Standard, 0),
        Err(Error::InvalidState)
    );
}

#[test]
fn central_grants_parameters() {
    let ctx = context();
    let handle = ConnHandle::new(2);
    let mut link = ctx.gatt_link();
    link.init().unwrap();
    ctx.dispatch(RadioEvent::Connected { handle });
    link.request_params(ConnPreset::LowPower, 0).unwrap();

    let granted = ConnPreset::LowPower.params();
    ctx.dispatch(RadioEvent::ConnParamsUpdated {
        handle,
        params: granted,
    });
    assert_eq!(link.phase(), LinkPhase::ParamsStable);
    assert_eq!(link.connection().unwrap().negotiated_params, granted);
    assert_eq!(
        drain(&ctx),
        vec![CommEvent::Connected(handle), CommEvent::ParamsUpdated(granted)]
    );
}

#[tokio::test]
async fn timer_task_runs_deferred_request() {
    let ctx = context();
    let handle = ConnHandle::new(4);
    let mut link = ctx.gatt_link();
    link.init().unwrap();
    ctx.dispatch(RadioEvent::Connected { handle });
    link.request_params(ConnPreset::Standard, 20).unwrap();
    assert_eq!(ctx.controller().count(|op| matches!(op, Op::UpdateConnParams(..))), 0);

    match select(ctx.run(), Timer::after(Duration::from_millis(200))).await {
        Either::First(never) => never,
        Either::Second(()) => {}
    }
    assert_eq!(
        ctx.controller().ops().last(),
        Some(&Op::UpdateConnParams(handle, ConnPreset::Standard.params()))
    );
}

#[test]
fn gatt_rides_on_advertising_radio() {
    let ctx = context();
    ctx.advertiser().init(ChannelMask::ALL).unwrap();
    let mut link = ctx.gatt_link();
    link.init().unwrap();
    assert_eq!(ctx.owner(), Some(RadioRole::Advertising));
    link.uninit().unwrap();
    assert_eq!(ctx.owner(), Some(RadioRole::Advertising));

    ctx.advertiser().uninit().unwrap();
    assert!(!ctx.is_owned());
}

#[test]
fn coded_advertising() {
    init_logger();
    let ctx: Context = RadioContext::new(
        ScriptedController::new(),
        RadioConfig {
            modulation: Phy::LeCoded,
        },
    );
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    adv.send(&[1, 2, 3]).unwrap();
    let descriptor = &ctx.controller().configured()[0];
    assert_eq!(descriptor.framing, Framing::Extended);
    assert_eq!(descriptor.phy_primary, Phy::LeCoded);
    assert_eq!(descriptor.phy_secondary, Some(Phy::LeCoded));
    assert_eq!(ctx.controller().ops()[0], Op::Enable(Phy::LeCoded));
}

#[test]
fn tx_power_snaps_up() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    assert_eq!(adv.set_tx_power(-30).unwrap().dbm(), -20);
    assert_eq!(adv.set_tx_power(9), Err(Error::InvalidParam));
    assert_eq!(adv.tx_power().dbm(), -20);
}

#[test]
fn event_queue_overflow_is_lossy() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    for _ in 0..EVENT_QUEUE_SIZE * 2 {
        adv.send(&[0]).unwrap();
        ctx.dispatch(RadioEvent::AdvSetTerminated);
    }
    assert_eq!(drain(&ctx).len(), EVENT_QUEUE_SIZE);
}

#[test]
fn controller_errors_surface() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    let err = adv.send(&[1]).unwrap_err();
    assert!(matches!(err, RadioError::Radio(Error::InvalidState)));
}

#[test]
fn peer_phy_request_gets_preferred_pair() {
    init_logger();
    let ctx: Context = RadioContext::new(
        ScriptedController::new(),
        RadioConfig {
            modulation: Phy::Le2M,
        },
    );
    let handle = ConnHandle::new(5);
    let preferred = Op::UpdatePhy(handle, PhyPair::symmetric(Phy::Le2M));
    ctx.gatt_link().init().unwrap();

    ctx.dispatch(RadioEvent::Connected { handle });
    assert_eq!(ctx.controller().count(|op| *op == preferred), 1);
    ctx.dispatch(RadioEvent::PhyUpdateRequest { handle });
    assert_eq!(ctx.controller().count(|op| *op == preferred), 2);
    assert_eq!(ctx.controller().count(|op| matches!(op, Op::UpdatePhy(..))), 2);

    let before = ctx.gatt_link().connection().unwrap().phy;
    ctx.dispatch(RadioEvent::PhyUpdateFailed { handle, status: 0x2a });
    assert_eq!(ctx.gatt_link().connection().unwrap().phy, before);

    ctx.dispatch(RadioEvent::PhyUpdated {
        handle,
        phys: PhyPair::symmetric(Phy::Le2M),
    });
    ctx.dispatch(RadioEvent::PhyUpdateFailed { handle, status: 0x2a });
    assert_eq!(
        ctx.gatt_link().connection().unwrap().phy,
        PhyPair::symmetric(Phy::Le2M)
    );
    assert_eq!(
        drain(&ctx),
        vec![
            CommEvent::Connected(handle),
            CommEvent::PhyUpdated(PhyPair::symmetric(Phy::Le2M))
        ]
    );
}

#[test]
fn oversized_send_is_data_too_large() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    assert_eq!(adv.send(&[0u8; 300]).unwrap_err(), Error::DataTooLarge);
    assert_eq!(adv.send_raw(&[0u8; 300]).unwrap_err(), Error::DataTooLarge);
    assert!(ctx.controller().configured().is_empty());
}

#[test]
fn raw_advertisement_goes_out_unchanged() {
    let ctx = context();
    let mut adv = ctx.advertiser();
    adv.init(ChannelMask::ALL).unwrap();
    adv.set_type(AdvType::NonConnScan);
    let data = [0x02, 0x01, 0x06, 0x04, 0xff, 0x99, 0x04, 0x05];
    adv.send_raw(&data).unwrap();

    let descriptor = &ctx.controller().configured()[0];
    assert_eq!(&descriptor.adv_payload[..], &data);
    assert_eq!(descriptor.repeat_count, 1);
    assert_eq!(descriptor.scan_response_payload, None);

    ctx.dispatch(RadioEvent::AdvSetTerminated);
    assert_eq!(drain(&ctx), vec![CommEvent::Sent]);
}

#[test]
fn address_round_trip() {
    let ctx = context();
    assert_eq!(ctx.address().unwrap_err(), Error::InvalidState);
    ctx.advertiser().init(ChannelMask::ALL).unwrap();

    let addr = BdAddr::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    ctx.set_address(addr).unwrap();
    assert_eq!(ctx.address().unwrap(), addr);
    assert!(ctx.controller().ops().contains(&Op::SetAddress(addr)));
}
