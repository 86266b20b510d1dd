/*!
 * Request extractors
 *
 * Public API:
 * - BearerContext: per-request RequestContext seeded from the Authorization header
 */

mod bearer;

pub use bearer::BearerContext;
