/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum image count to register images in parallel with Rayon.
pub const PARALLEL_IMAGE_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Largest canvas area (width * height) the compositor will allocate.
pub const MAX_CANVAS_PIXELS: f64 = i32::MAX as f64;

/// Minimum number of images in an alignment run.
pub const MIN_IMAGES: usize = 2;

/// Lowe's ratio test: a match is good iff best < ratio * second best.
pub const DEFAULT_MATCH_RATIO: f32 = 0.75;

/// Number of neighbours requested from the k-NN matcher.
pub const KNN_NEIGHBOURS: usize = 2;

/// Fewest good matches that still allow a homography fit (strictly more than 4).
pub const MIN_GOOD_MATCHES: usize = 5;

/// RANSAC reprojection tolerance as a fraction of the larger source dimension.
pub const DEFAULT_INLIER_THRESHOLD: f64 = 0.005;

/// Homographies with a smaller absolute determinant are treated as degenerate.
pub const MIN_HOMOGRAPHY_DETERMINANT: f64 = 1e-6;

/// Default upper bound on RANSAC iterations.
pub const DEFAULT_RANSAC_ITERATIONS: usize = 2000;

/// Confidence used for adaptive RANSAC termination.
pub const RANSAC_CONFIDENCE: f64 = 0.995;

/// Default RNG seed so repeated runs pick the same RANSAC samples.
pub const DEFAULT_RANSAC_SEED: u64 = 0x5eed_51de;

/// Default cap on keypoints kept per image (strongest first).
pub const DEFAULT_MAX_KEYPOINTS: usize = 1000;

/// Harris corner sensitivity `k` in `det(M) - k * trace(M)^2`.
pub const DEFAULT_HARRIS_K: f32 = 0.04;

/// Keypoints weaker than this fraction of the strongest response are dropped.
pub const HARRIS_RELATIVE_THRESHOLD: f32 = 0.01;

/// Half-width of the square patch a descriptor is sampled from.
pub const DESCRIPTOR_RADIUS: usize = 8;

/// Descriptor grid size per axis (the patch is box-averaged down to this).
pub const DESCRIPTOR_GRID: usize = 8;

/// Moving-least-squares weight exponent.
pub const DEFAULT_MLS_ALPHA: f64 = 1.0;

/// Mesh subdivisions along each axis for moving-least-squares warping.
pub const DEFAULT_MESH_RESOLUTION: usize = 64;

/// Number of samples taken along each image edge when mapping the outline.
pub const OUTLINE_SAMPLES_PER_EDGE: usize = 64;

/// Minimum landmarks per image for translation and affine registration.
pub const MIN_LANDMARKS: usize = 3;

/// Minimum landmarks per image for projective registration.
pub const MIN_LANDMARKS_PROJECTIVE: usize = 4;

/// Warp working buffers per input image used in the memory estimate
/// (the warped raster, its coverage mask and the original kept for compositing).
pub const WARP_BUFFER_FACTOR: u64 = 3;

/// Composited stack size (in bytes) above which `PlaneStorage::Auto` spills
/// planes to disk. Default: 1 GiB.
pub const SPILL_THRESHOLD_BYTES: usize = 1_073_741_824;
