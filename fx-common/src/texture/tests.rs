//! Tests for the texture packer

use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::error::FetchError;

const FACE_SIZES: [usize; CUBE_FACES] = [24661, 26074, 26845, 24422, 24461, 27099];

fn face_urls(prefix: &str) -> [String; CUBE_FACES] {
    std::array::from_fn(|face| format!("{prefix}/face{face}.jpg"))
}

fn cube_fetcher(prefix: &str) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    for (face, url) in face_urls(prefix).into_iter().enumerate() {
        fetcher.insert(url, vec![face as u8; FACE_SIZES[face]]);
    }
    fetcher
}

fn cube_input(prefix: &str) -> TextureInput {
    TextureInput::cube(vec![face_urls(prefix).map(ImageSource::Url)])
}

#[tokio::test]
async fn test_same_url_shares_one_image() {
    let fetcher = Arc::new(MemoryFetcher::new().with_image("crate.png", vec![1, 2, 3]));
    let inputs = [
        TextureInput::image(ImageSource::url("crate.png")).with_param("flipY", true),
        TextureInput::image(ImageSource::url("crate.png")),
    ];

    let bundle = pack_textures(&inputs, fetcher.clone()).await.unwrap();

    assert_eq!(bundle.images, vec![vec![1, 2, 3]]);
    assert_eq!(fetcher.fetch_count(), 1);
    assert!(bundle.bins.is_empty());
    for texture in &bundle.textures {
        assert!(matches!(texture, TextureDescriptor::Image(image) if image.source == 0));
    }
    match &bundle.textures[0] {
        TextureDescriptor::Image(image) => assert_eq!(image.params["flipY"], json!(true)),
        other => panic!("expected image texture, got {other:?}"),
    }
}

#[tokio::test]
async fn test_identical_content_from_different_urls_is_kept_apart() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_image("a.png", vec![5; 4])
            .with_image("b.png", vec![5; 4]),
    );
    let inputs = [
        TextureInput::image(ImageSource::url("a.png")),
        TextureInput::image(ImageSource::url("b.png")),
    ];

    let bundle = pack_textures(&inputs, fetcher).await.unwrap();
    assert_eq!(bundle.images.len(), 2);
}

#[tokio::test]
async fn test_cube_faces_are_contiguous() {
    let fetcher = Arc::new(cube_fetcher("sky"));
    let bundle = pack_textures(&[cube_input("sky")], fetcher.clone()).await.unwrap();

    assert_eq!(fetcher.fetch_count(), CUBE_FACES);
    assert_eq!(bundle.bins.len(), 1);
    assert_eq!(bundle.bins[0].len(), FACE_SIZES.iter().sum::<usize>());
    assert_eq!(bundle.bins[0].len(), 153562);

    let TextureDescriptor::Cube(cube) = &bundle.textures[0] else {
        panic!("expected cube texture");
    };
    assert_eq!(cube.target, TEXTURE_CUBE_MAP);
    assert_eq!(cube.mipmaps.len(), 1);

    let offsets: Vec<u32> = cube.mipmaps[0].iter().map(|p| p.byte_offset).collect();
    assert_eq!(offsets, vec![0, 24661, 50735, 77580, 102002, 126463]);
    for (pointer, &size) in cube.mipmaps[0].iter().zip(&FACE_SIZES) {
        assert_eq!(pointer.buffer_index, 0);
        assert_eq!(pointer.byte_length as usize, size);
        assert_eq!(pointer.element_type, None);
    }
}

#[tokio::test]
async fn test_each_cube_gets_its_own_bin() {
    let mut fetcher = cube_fetcher("day");
    for (face, url) in face_urls("night").into_iter().enumerate() {
        fetcher.insert(url, vec![0xF0 | face as u8; 16]);
    }
    let fetcher = Arc::new(fetcher);

    let inputs = [
        cube_input("day"),
        TextureInput::image(ImageSource::url("day/face0.jpg")),
        cube_input("night"),
        cube_input("day"),
    ];
    let bundle = pack_textures(&inputs, fetcher.clone()).await.unwrap();

    // day faces are fetched once even though two cubes and one 2D texture use them
    assert_eq!(fetcher.fetch_count(), 2 * CUBE_FACES);
    assert_eq!(bundle.bins.len(), 3);
    assert_eq!(bundle.bins[0], bundle.bins[2]);
    assert_eq!(bundle.bins[1].len(), 6 * 16);
    assert_eq!(bundle.images.len(), 1);

    let bins: Vec<Option<u32>> = bundle
        .textures
        .iter()
        .map(|texture| match texture {
            TextureDescriptor::Cube(cube) => cube.bin_index(),
            TextureDescriptor::Image(_) => None,
        })
        .collect();
    assert_eq!(bins, vec![Some(0), None, Some(1), Some(2)]);
}

#[tokio::test]
async fn test_mipmap_levels_keep_order() {
    let mut fetcher = MemoryFetcher::new();
    for level in 0..3usize {
        for (face, url) in face_urls(&format!("lod{level}")).into_iter().enumerate() {
            fetcher.insert(url, vec![(level * 10 + face) as u8; 8 >> level]);
        }
    }
    let mipmaps = (0..3)
        .map(|level| face_urls(&format!("lod{level}")).map(ImageSource::Url))
        .collect();

    let bundle = pack_textures(&[TextureInput::cube(mipmaps)], Arc::new(fetcher))
        .await
        .unwrap();
    let unpacked = bundle.unpack().unwrap();

    let UnpackedTexture::Cube { mipmaps, .. } = &unpacked[0] else {
        panic!("expected cube texture");
    };
    assert_eq!(mipmaps.len(), 3);
    assert_eq!(mipmaps[0][0], &[0u8; 8][..]);
    assert_eq!(mipmaps[1][5], &[15u8; 4][..]);
    assert_eq!(mipmaps[2][3], &[23u8; 2][..]);
}

/// Holds back one URL until every other fetch has had time to finish
struct SlowFetcher {
    slow: String,
    inner: MemoryFetcher,
}

impl ImageFetcher for SlowFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let fetch = self.inner.fetch(url);
        let delay = url == self.slow;
        Box::pin(async move {
            if delay {
                for _ in 0..200 {
                    tokio::task::yield_now().await;
                }
            }
            fetch.await
        })
    }
}

#[tokio::test]
async fn test_layout_ignores_completion_order() {
    let faces = ["slow.png", "fast.png", "f2.png", "f3.png", "f4.png", "f5.png"];
    let mut inner = MemoryFetcher::new().with_image("slow.png", vec![1; 5]);
    for url in &faces[1..] {
        inner.insert(*url, vec![2; 3]);
    }
    let fetcher = Arc::new(SlowFetcher {
        slow: "slow.png".to_string(),
        inner,
    });

    let inputs = [
        TextureInput::image(ImageSource::url("slow.png")),
        TextureInput::image(ImageSource::url("fast.png")),
        TextureInput::cube(vec![faces.map(ImageSource::url)]),
    ];
    let bundle = pack_textures(&inputs, fetcher).await.unwrap();

    assert_eq!(bundle.images, vec![vec![1; 5], vec![2; 3]]);
    let TextureDescriptor::Cube(cube) = &bundle.textures[2] else {
        panic!("expected cube texture");
    };
    let offsets: Vec<u32> = cube.mipmaps[0].iter().map(|p| p.byte_offset).collect();
    assert_eq!(offsets, vec![0, 5, 8, 11, 14, 17]);
    assert_eq!(&bundle.bins[0].as_bytes()[..5], [1u8; 5].as_slice());
}

#[tokio::test]
async fn test_fetch_failure_fails_whole_call() {
    let fetcher = Arc::new(MemoryFetcher::new().with_image("a.png", vec![1]));
    let inputs = [
        TextureInput::image(ImageSource::url("a.png")),
        TextureInput::image(ImageSource::url("broken.png")),
    ];

    let err = pack_textures(&inputs, fetcher).await.unwrap_err();
    assert!(matches!(err, PackError::Fetch(FetchError::NotFound(url)) if url == "broken.png"));
}

#[tokio::test]
async fn test_empty_cube_is_rejected_before_fetching() {
    let fetcher = Arc::new(MemoryFetcher::new().with_image("a.png", vec![1]));
    let inputs = [
        TextureInput::image(ImageSource::url("a.png")),
        TextureInput::cube(Vec::new()),
    ];

    let err = pack_textures(&inputs, fetcher.clone()).await.unwrap_err();
    assert!(matches!(err, PackError::UnsupportedTextureSource { index: 1, .. }));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_in_memory_sources() {
    let encoded = ImageSource::encoded(vec![0xAB; 5]);
    let pixels = ImageSource::pixels(image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])));
    let inputs = [
        TextureInput::image(encoded.clone()),
        TextureInput::image(pixels),
        TextureInput::image(encoded),
    ];

    let bundle = pack_textures(&inputs, Arc::new(MemoryFetcher::new())).await.unwrap();
    assert_eq!(bundle.images.len(), 2);
    assert_eq!(bundle.images[0], vec![0xAB; 5]);
    assert_eq!(&bundle.images[1][..4], b"\x89PNG");

    let sources: Vec<u32> = bundle
        .textures
        .iter()
        .filter_map(|texture| match texture {
            TextureDescriptor::Image(image) => Some(image.source),
            TextureDescriptor::Cube(_) => None,
        })
        .collect();
    assert_eq!(sources, vec![0, 1, 0]);
}

#[tokio::test]
async fn test_descriptor_json_round_trip() {
    let mut fetcher = cube_fetcher("sky");
    fetcher.insert("logo.png", vec![9; 3]);
    let inputs = [
        TextureInput::image(ImageSource::url("logo.png")).with_param("wrapS", 33071),
        cube_input("sky").with_param("generateMipmaps", false),
    ];
    let bundle = pack_textures(&inputs, Arc::new(fetcher)).await.unwrap();

    let json = bundle.descriptor_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["version"], "1.0");
    assert_eq!(value["textures"][0], json!({ "source": 0, "wrapS": 33071 }));
    assert_eq!(value["textures"][1]["sourceType"], "cube");
    assert_eq!(value["textures"][1]["target"], TEXTURE_CUBE_MAP);
    assert_eq!(value["textures"][1]["mipmaps"][0][1], json!([20, [0, 24661, 26074]]));
    assert_eq!(value["textures"][1]["generateMipmaps"], false);

    let restored =
        TextureBundle::from_descriptor_json(&json, bundle.images.clone(), bundle.bins.clone())
            .unwrap();
    assert_eq!(restored, bundle);
}

#[test]
fn test_unpack_reports_missing_image() {
    let bundle = TextureBundle {
        version: crate::FORMAT_VERSION.to_string(),
        images: Vec::new(),
        bins: Vec::new(),
        textures: vec![TextureDescriptor::Image(ImageTextureDescriptor {
            source: 2,
            params: Map::new(),
        })],
    };
    assert_eq!(
        bundle.unpack().unwrap_err(),
        ReconstructError::UnknownImage { index: 2, count: 0 }
    );
}

#[test]
fn test_input_from_value_shapes() {
    let image = TextureInput::from_value(0, &json!({ "image": "a.png", "flipY": true })).unwrap();
    assert!(matches!(image.source, TextureSource::Image(ImageSource::Url(ref url)) if url == "a.png"));
    assert_eq!(image.params.get("flipY"), Some(&json!(true)));
    assert!(image.params.get("image").is_none());

    let legacy = TextureInput::from_value(0, &json!({ "url": "b.png" })).unwrap();
    assert!(matches!(legacy.source, TextureSource::Image(ImageSource::Url(ref url)) if url == "b.png"));

    let faces = json!(["px", "nx", { "url": "py" }, "ny", "pz", "nz"]);
    let cube = TextureInput::from_value(0, &json!({ "target": 34067, "mipmaps": [faces, faces] }))
        .unwrap();
    match &cube.source {
        TextureSource::Cube { mipmaps } => {
            assert_eq!(mipmaps.len(), 2);
            assert!(matches!(&mipmaps[0][2], ImageSource::Url(url) if url == "py"));
        }
        other => panic!("expected cube source, got {other:?}"),
    }
    assert!(cube.params.is_empty());

    let shorthand = TextureInput::from_value(0, &json!({ "cube": faces })).unwrap();
    assert!(matches!(&shorthand.source, TextureSource::Cube { mipmaps } if mipmaps.len() == 1));
}

#[test]
fn test_input_from_value_rejects_unsupported_shapes() {
    let cases = [
        json!("a.png"),
        json!({ "wrapS": 33071 }),
        json!({ "image": 12 }),
        json!({ "cube": ["a", "b", "c"] }),
        json!({ "target": 34067, "mipmaps": [] }),
        json!({ "target": 3553, "mipmaps": [["a", "b", "c", "d", "e", "f"]] }),
        json!({
            "mipmaps": [["a", "b", "c", "d", "e", "f"]],
            "cube": ["a", "b", "c", "d", "e", "f"]
        }),
    ];
    for (index, case) in cases.iter().enumerate() {
        let err = TextureInput::from_value(index, case).unwrap_err();
        assert!(
            matches!(err, PackError::UnsupportedTextureSource { index: i, .. } if i == index),
            "case {index}: {err:?}"
        );
    }
}
