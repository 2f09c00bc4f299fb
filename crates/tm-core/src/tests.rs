//! Unit tests for tm-core primitives.

#[cfg(test)]
mod ids {
    use crate::{ActorId, JunctionId, SegmentId, WaypointId};

    #[test]
    fn invalid_sentinels_are_max() {
        assert_eq!(ActorId::INVALID.0, u64::MAX);
        assert_eq!(WaypointId::INVALID.0, u64::MAX);
    }

    #[test]
    fn waypoint_id_composition() {
        let id = WaypointId::compose(SegmentId(7), 42);
        assert_eq!(id.segment(), SegmentId(7));
        assert_eq!(id.0 & 0xff_ffff, 42);
    }

    #[test]
    fn junction_none_sentinel() {
        assert!(!JunctionId::NONE.is_some());
        assert!(JunctionId(3).is_some());
        assert_eq!(JunctionId::default(), JunctionId::NONE);
    }

    #[test]
    fn display() {
        assert_eq!(ActorId(7).to_string(), "ActorId(7)");
        assert_eq!(JunctionId(-1).to_string(), "JunctionId(-1)");
    }
}

#[cfg(test)]
mod geo {
    use crate::geo::{angle_between_deg, cross_sign_2d};
    use crate::{Rotation, Vec3};

    #[test]
    fn vector_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(a.dot(b), 32.0);
    }

    #[test]
    fn distance_and_planar_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 12.0);
        assert!((a.distance(b) - 13.0).abs() < 1e-5);
        assert!((a.distance_squared_2d(b) - 25.0).abs() < 1e-5);
    }

    #[test]
    fn normalized_degenerate_is_zero() {
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
        let unit = Vec3::new(0.0, 2.0, 0.0).normalized();
        assert!((unit.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn yaw_forward_vector() {
        let east = Rotation::from_yaw(0.0).forward_vector();
        assert!((east.x - 1.0).abs() < 1e-6 && east.y.abs() < 1e-6);

        let north = Rotation::from_yaw(90.0).forward_vector();
        assert!(north.x.abs() < 1e-6 && (north.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn angle_between_headings() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 0.0);
        assert!((angle_between_deg(a, b) - 90.0).abs() < 1e-3);
        assert!(angle_between_deg(a, a) < 1e-3);
    }

    #[test]
    fn cross_sign_left_positive() {
        let forward = Vec3::new(1.0, 0.0, 0.0);
        assert!(cross_sign_2d(forward, Vec3::new(0.0, 1.0, 0.0)) > 0.0);
        assert!(cross_sign_2d(forward, Vec3::new(0.0, -1.0, 0.0)) < 0.0);
    }
}

#[cfg(test)]
mod rng {
    use crate::{ActorId, ActorRng};

    #[test]
    fn deterministic_same_seed() {
        let mut r1 = ActorRng::new(12345, ActorId(10));
        let mut r2 = ActorRng::new(12345, ActorId(10));
        for _ in 0..100 {
            assert_eq!(r1.next_percentage(), r2.next_percentage());
        }
    }

    #[test]
    fn different_actors_differ() {
        let mut r0 = ActorRng::new(1, ActorId(0));
        let mut r1 = ActorRng::new(1, ActorId(1));
        let a: f32 = r0.next_percentage();
        let b: f32 = r1.next_percentage();
        assert_ne!(a, b, "seeds for adjacent actors should diverge");
    }

    #[test]
    fn percentage_in_range() {
        let mut rng = ActorRng::new(0, ActorId(3));
        for _ in 0..1000 {
            let p = rng.next_percentage();
            assert!((0.0..100.0).contains(&p));
        }
    }
}

#[cfg(test)]
mod command {
    use crate::{RoadOption, VehicleControl, VehicleLightFlags};

    #[test]
    fn light_flag_set_clear() {
        let mut flags = VehicleLightFlags::default();
        flags.set(VehicleLightFlags::BRAKE, true);
        flags.set(VehicleLightFlags::LEFT_BLINKER, true);
        assert!(flags.contains(VehicleLightFlags::BRAKE));
        flags.set(VehicleLightFlags::BRAKE, false);
        assert!(!flags.contains(VehicleLightFlags::BRAKE));
        assert!(flags.contains(VehicleLightFlags::LEFT_BLINKER));
    }

    #[test]
    fn road_option_byte_roundtrip() {
        for b in 0u8..=7 {
            assert_eq!(RoadOption::from_u8(b) as u8, b);
        }
        assert_eq!(RoadOption::from_u8(200), RoadOption::Void);
    }

    #[test]
    fn full_stop_control() {
        let c = VehicleControl::full_stop();
        assert_eq!(c.brake, 1.0);
        assert_eq!(c.throttle, 0.0);
    }
}

#[cfg(test)]
mod time {
    use crate::Timestamp;

    #[test]
    fn seconds_since() {
        let a = Timestamp::new(10, 1.5);
        let b = Timestamp::new(30, 4.0);
        assert!((b.seconds_since(a) - 2.5).abs() < 1e-9);
    }
}
