use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};

use crate::collision::{Mask, SpriteMasks};
use crate::physics::{
    ACTOR_HEIGHT, ACTOR_WIDTH, FLOOR_Y, GROUND_TILE_HEIGHT, GROUND_TILE_WIDTH, OBSTACLE_HEIGHT,
    OBSTACLE_WIDTH, WIN_HEIGHT, WIN_WIDTH,
};
use crate::simulation::RenderFrame;

const SKY_COLOR: Color = Color::rgb(0.31, 0.75, 0.79);
const GROUND_COLOR: Color = Color::rgb(0.87, 0.84, 0.58);
const ACTOR_RGBA: [u8; 4] = [250, 200, 40, 255];
const BARRIER_RGBA: [u8; 4] = [90, 180, 50, 255];

// Draw order, back to front
const BARRIER_Z: f32 = 1.0;
const GROUND_Z: f32 = 2.0;
const ACTOR_Z: f32 = 3.0;

// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

// Tags every entity redrawn from a RenderFrame
#[derive(Component)]
pub struct SceneSprite;

/// Textures built from the same silhouettes the collision oracle tests.
#[derive(Resource)]
pub struct SpriteTextures {
    pub actor_frames: Vec<Handle<Image>>,
    pub top_barrier: Handle<Image>,
    pub bottom_barrier: Handle<Image>,
}

/// The most recent snapshot handed to the renderer.
#[derive(Resource, Default)]
pub struct LatestFrame(pub RenderFrame);

pub fn mask_rgba(mask: &Mask, color: [u8; 4]) -> Vec<u8> {
    let mut data = Vec::with_capacity((mask.width() * mask.height() * 4) as usize);
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let pixel = if mask.get(x, y) { color } else { [0, 0, 0, 0] };
            data.extend_from_slice(&pixel);
        }
    }
    data
}

fn mask_image(mask: &Mask, color: [u8; 4]) -> Image {
    Image::new(
        Extent3d {
            width: mask.width(),
            height: mask.height(),
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        mask_rgba(mask, color),
        TextureFormat::Rgba8UnormSrgb,
    )
}

/// Centre of a `width` x `height` box whose top-left corner sits at `(x, y)`
/// in screen coordinates (origin top-left, y down).
pub fn screen_to_world(x: f32, y: f32, width: f32, height: f32) -> Vec2 {
    Vec2::new(
        x + width / 2.0 - WIN_WIDTH / 2.0,
        WIN_HEIGHT / 2.0 - y - height / 2.0,
    )
}

// --- Systems ---

pub fn setup_graphics(mut commands: Commands) {
    commands.insert_resource(ClearColor(SKY_COLOR));
    commands.spawn((Camera2dBundle::default(), MainCamera));
}

pub fn setup_sprite_textures(mut commands: Commands, mut images: ResMut<Assets<Image>>) {
    let masks = SpriteMasks::shared();
    let actor_frames = masks
        .actor_frames
        .iter()
        .map(|frame| images.add(mask_image(frame, ACTOR_RGBA)))
        .collect();
    commands.insert_resource(SpriteTextures {
        actor_frames,
        top_barrier: images.add(mask_image(&masks.top_barrier, BARRIER_RGBA)),
        bottom_barrier: images.add(mask_image(&masks.bottom_barrier, BARRIER_RGBA)),
    });
    debug!("sprite textures built from collision masks");
}

// Despawns the previous scene and spawns one sprite per actor, barrier and ground tile.
pub fn draw_scene(
    mut commands: Commands,
    latest: Res<LatestFrame>,
    textures: Option<Res<SpriteTextures>>,
    scene_query: Query<Entity, With<SceneSprite>>,
) {
    let Some(textures) = textures else {
        return;
    };
    if !latest.is_changed() {
        return;
    }
    for entity in scene_query.iter() {
        commands.entity(entity).despawn();
    }

    let frame = &latest.0;
    let barrier_size = (OBSTACLE_WIDTH as f32, OBSTACLE_HEIGHT as f32);
    for obstacle in &frame.obstacles {
        let top = screen_to_world(obstacle.x, obstacle.top_edge - barrier_size.1, barrier_size.0, barrier_size.1);
        let bottom = screen_to_world(obstacle.x, obstacle.bottom_edge, barrier_size.0, barrier_size.1);
        for (texture, position) in [(&textures.top_barrier, top), (&textures.bottom_barrier, bottom)] {
            commands.spawn((
                SpriteBundle {
                    texture: texture.clone(),
                    transform: Transform::from_translation(position.extend(BARRIER_Z)),
                    ..default()
                },
                SceneSprite,
            ));
        }
    }

    for offset in frame.ground {
        let position = screen_to_world(offset, FLOOR_Y, GROUND_TILE_WIDTH, GROUND_TILE_HEIGHT);
        commands.spawn((
            SpriteBundle {
                sprite: Sprite {
                    color: GROUND_COLOR,
                    custom_size: Some(Vec2::new(GROUND_TILE_WIDTH, GROUND_TILE_HEIGHT)),
                    ..default()
                },
                transform: Transform::from_translation(position.extend(GROUND_Z)),
                ..default()
            },
            SceneSprite,
        ));
    }

    for actor in &frame.actors {
        let Some(texture) = textures.actor_frames.get(actor.frame) else {
            continue;
        };
        let position = screen_to_world(actor.x, actor.y, ACTOR_WIDTH as f32, ACTOR_HEIGHT as f32);
        commands.spawn((
            SpriteBundle {
                texture: texture.clone(),
                transform: Transform::from_translation(position.extend(ACTOR_Z))
                    .with_rotation(Quat::from_rotation_z(actor.rotation.to_radians())),
                ..default()
            },
            SceneSprite,
        ));
    }
}
