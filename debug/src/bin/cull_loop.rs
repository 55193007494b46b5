//! Host loop: a grid of boxes behind a wall occluder, culled through the CullBackend trait
//! while the camera strafes past the wall.

use cull_api::{
    Aabb, CullBackend, ExtractedFrame, ExtractedGroupInstances, ExtractedInstanceGroup, ExtractedOccluder,
    ExtractedRoom, ExtractedRoomMesh, ExtractedScene, ExtractedView, IndexRange,
};
use glam::{Mat4, Vec3};
use hizcull_renderer::CullConfig;

const GRID: u32 = 16;
const GROUP_KEY: u32 = 1;
const FRAMES: u32 = 8;

fn box_indices() -> IndexRange {
    IndexRange { index_count: 36, first_index: 0, base_vertex: 0 }
}

fn build_scene() -> ExtractedScene {
    let mut meshes = Vec::new();
    for i in 0..GRID * GRID {
        let (x, z) = ((i % GRID) as f32 - GRID as f32 / 2.0, -((i / GRID) as f32) - 6.0);
        meshes.push(ExtractedRoomMesh {
            mesh_key: i as u64,
            indices: box_indices(),
            transform: Mat4::from_translation(Vec3::new(x * 1.5, 0.0, z * 1.5)).to_cols_array(),
            local_bounds: Aabb::new([-0.5; 3], [0.5; 3]),
            billboard: false,
            // every other row is drawn instanced
            instance_group: ((i / GRID) % 2 == 1 && i % GRID < 8).then_some(GROUP_KEY),
        });
    }
    // wall at z = -4, 8 wide, 4 high
    let wall: [[f32; 3]; 4] = [[-4.0, -2.0, -4.0], [4.0, -2.0, -4.0], [4.0, 2.0, -4.0], [-4.0, 2.0, -4.0]];
    ExtractedScene {
        rooms: vec![ExtractedRoom { meshes }],
        instance_groups: vec![ExtractedInstanceGroup { group_key: GROUP_KEY, indices: box_indices() }],
        occluders: vec![ExtractedOccluder {
            entity_id: 1,
            vertex_data: bytemuck::cast_slice(&wall).to_vec(),
            index_data: bytemuck::cast_slice(&[0u32, 1, 2, 0, 2, 3]).to_vec(),
            transform: Mat4::IDENTITY.to_cols_array(),
        }],
        ..Default::default()
    }
}

fn frame_input(scene: &ExtractedScene) -> ExtractedFrame {
    let mut frame = ExtractedFrame::default();
    let mut members = Vec::new();
    for mesh in scene.rooms.iter().flat_map(|r| &r.meshes) {
        match mesh.instance_group {
            Some(_) => members.push(mesh.mesh_key),
            None => frame.visible_meshes.push(mesh.mesh_key),
        }
    }
    frame.visible_instances.push(ExtractedGroupInstances { group_key: GROUP_KEY, mesh_keys: members });
    frame
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = CullConfig {
        hiz_width: 512,
        hiz_height: 256,
        max_instances_per_group: 128,
        draw_statistics: true,
        warmup_sweep: true,
        ..CullConfig::default()
    };
    let mut backend: Box<dyn CullBackend> = hizcull_bridge::create_headless(config)?;
    let scene = build_scene();
    backend.prepare(&scene)?;
    let frame = frame_input(&scene);

    let proj = Mat4::perspective_rh(60f32.to_radians(), 2.0, 0.1, 100.0);
    for f in 0..FRAMES {
        let eye = Vec3::new(-6.0 + f as f32 * 1.5, 0.0, 0.0);
        let view_proj = proj * Mat4::look_at_rh(eye, eye + Vec3::NEG_Z, Vec3::Y);
        let report = backend.cull_frame(&ExtractedView { view_proj: view_proj.to_cols_array() }, &frame)?;
        println!(
            "frame {f}: eye x {:+.1}, {} candidates, {} visible groups, {} visible draws",
            eye.x,
            report.candidates,
            report.visible_groups,
            report.visible_draws.map_or("-".to_string(), |n| n.to_string())
        );
    }
    Ok(())
}
