//! Spatial queries must agree with a brute-force oracle no matter which
//! internal branch (cell iteration, full scan, slice pruning) serves them.

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use server_core::ActiveObjectMgr;
use world_core::geom::Aabb;
use world_core::{ActiveObject, ObjectId, ObjectKind};

struct TestObject {
    id: ObjectId,
    pos: Vec3,
}

impl ActiveObject for TestObject {
    fn id(&self) -> ObjectId {
        self.id
    }
    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }
    fn base_position(&self) -> Vec3 {
        self.pos
    }
    fn set_base_position(&mut self, pos: Vec3) {
        self.pos = pos;
    }
    fn is_gone(&self) -> bool {
        false
    }
    fn kind(&self) -> ObjectKind {
        ObjectKind::Npc
    }
}

fn build(n: u16) -> (ActiveObjectMgr<TestObject>, Vec<(ObjectId, Vec3)>) {
    let mgr = ActiveObjectMgr::new();
    let mut rng = SmallRng::seed_from_u64(2010112);
    let mut population = Vec::with_capacity(usize::from(n));
    for i in 1..=n {
        let pos = Vec3::new(
            rng.random_range(-2001.0..2001.0),
            rng.random_range(-20.0..60.0),
            rng.random_range(-2001.0..2001.0),
        );
        // Pre-assigned ids keep registration cheap at this population size.
        let id = ObjectId(i);
        assert!(mgr.register_object(TestObject { id, pos }));
        population.push((id, pos));
    }
    (mgr, population)
}

fn sorted_ids(hits: &[server_core::ObjectHandle<TestObject>]) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = hits.iter().map(|h| h.borrow().id()).collect();
    ids.sort();
    ids
}

#[test]
fn radius_queries_match_brute_force_across_the_pruning_threshold() {
    let (mgr, population) = build(10_000);
    let centers = [
        Vec3::ZERO,
        Vec3::new(1500.0, 20.0, -800.0),
        Vec3::new(-3.7, 50.0, 4.1),
    ];
    for center in centers {
        for radius in [0.5f32, 30.0, 61.0, 80.0, 200.0, 500.0] {
            let mut hits = Vec::new();
            mgr.get_objects_inside_radius(center, radius, &mut hits, None);

            let mut expected: Vec<ObjectId> = population
                .iter()
                .filter(|(_, pos)| pos.distance_squared(center) <= radius * radius)
                .map(|(id, _)| *id)
                .collect();
            expected.sort();
            assert_eq!(
                sorted_ids(&hits),
                expected,
                "radius {radius} around {center} diverged from the oracle"
            );
        }
    }
    mgr.clear();
}

#[test]
fn area_queries_match_brute_force_on_both_branches() {
    let (mgr, population) = build(10_000);
    let boxes = [
        // Small box: candidate cells are few, the cell walk serves it.
        Aabb::new(Vec3::new(-40.0, -20.0, -40.0), Vec3::new(40.0, 60.0, 40.0)),
        // Thin slab crossing the whole world.
        Aabb::new(Vec3::new(-2001.0, -5.0, -2001.0), Vec3::new(2001.0, 5.0, 2001.0)),
        // Whole world: the full scan serves it.
        Aabb::new(Vec3::splat(-3000.0), Vec3::splat(3000.0)),
        // Straddling the zero planes.
        Aabb::new(Vec3::new(-17.0, -17.0, -17.0), Vec3::new(17.0, 17.0, 17.0)),
    ];
    for bounds in boxes {
        let mut hits = Vec::new();
        mgr.get_objects_in_area(&bounds, &mut hits, None);

        let mut expected: Vec<ObjectId> = population
            .iter()
            .filter(|(_, pos)| bounds.contains_point(*pos))
            .map(|(id, _)| *id)
            .collect();
        expected.sort();
        assert_eq!(
            sorted_ids(&hits),
            expected,
            "area {bounds:?} diverged from the oracle"
        );
    }
    mgr.clear();
}
