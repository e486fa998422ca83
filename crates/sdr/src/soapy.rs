// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_longlong, c_void};
use std::ptr;

use crate::{clock_time, ClockTime, Frequency, Radio, ReadBlock, SdrError};

type SoapyDevice = c_void;
type SoapyStream = c_void;

// SoapySDR constants
const SOAPY_SDR_RX: c_int = 0;
const SOAPY_SDR_HAS_TIME: c_int = 1 << 2;

/// Read timeout in microseconds
const READ_TIMEOUT_US: c_longlong = 1_000_000;

// SoapySDRKwargs
#[repr(C)]
struct SoapyKwargs {
    size: usize,
    keys: *mut *mut c_char,
    vals: *mut *mut c_char,
}

extern "C" {
    fn SoapySDRDevice_enumerate(args: *const SoapyKwargs, length: *mut usize) -> *mut SoapyKwargs;
    fn SoapySDRDevice_makeStrArgs(args: *const c_char) -> *mut SoapyDevice;
    fn SoapySDRDevice_unmake(device: *mut SoapyDevice) -> c_int;
    fn SoapySDRDevice_getHardwareInfo(device: *const SoapyDevice) -> SoapyKwargs;
    fn SoapySDRDevice_getChannelInfo(
        device: *const SoapyDevice,
        direction: c_int,
        channel: usize,
    ) -> SoapyKwargs;
    fn SoapySDRDevice_getNumChannels(device: *const SoapyDevice, direction: c_int) -> usize;
    fn SoapySDRDevice_listSampleRates(
        device: *const SoapyDevice,
        direction: c_int,
        channel: usize,
        length: *mut usize,
    ) -> *mut c_double;
    fn SoapySDRDevice_getNativeStreamFormat(
        device: *const SoapyDevice,
        direction: c_int,
        channel: usize,
        full_scale: *mut c_double,
    ) -> *const c_char;
    fn SoapySDRDevice_setSampleRate(
        device: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        rate: c_double,
    ) -> c_int;
    fn SoapySDRDevice_setGain(
        device: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        value: c_double,
    ) -> c_int;
    fn SoapySDRDevice_setFrequency(
        device: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        frequency: c_double,
        args: *const SoapyKwargs,
    ) -> c_int;
    fn SoapySDRDevice_setupStream(
        device: *mut SoapyDevice,
        direction: c_int,
        format: *const c_char,
        channels: *const usize,
        num_chans: usize,
        args: *const SoapyKwargs,
    ) -> *mut SoapyStream;
    fn SoapySDRDevice_activateStream(
        device: *mut SoapyDevice,
        stream: *mut SoapyStream,
        flags: c_int,
        time_ns: i64,
        num_elems: usize,
    ) -> c_int;
    fn SoapySDRDevice_deactivateStream(
        device: *mut SoapyDevice,
        stream: *mut SoapyStream,
        flags: c_int,
        time_ns: i64,
    ) -> c_int;
    fn SoapySDRDevice_closeStream(device: *mut SoapyDevice, stream: *mut SoapyStream) -> c_int;
    fn SoapySDRDevice_readStream(
        device: *mut SoapyDevice,
        stream: *mut SoapyStream,
        buffs: *const *mut c_void,
        num_elems: usize,
        flags: *mut c_int,
        time_ns: *mut c_longlong,
        timeout_us: c_longlong,
    ) -> c_int;
    fn SoapySDRDevice_lastError() -> *const c_char;
    fn SoapySDRKwargsList_clear(args: *mut SoapyKwargs, length: usize);
    // listSampleRates hands back a malloc'd array
    fn free(p: *mut c_void);
}

fn last_error() -> String {
    unsafe {
        let p = SoapySDRDevice_lastError();
        if p.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(p).to_string_lossy().to_string()
        }
    }
}

/// Copy a SoapySDRKwargs into owned key/value pairs.
fn kwargs_pairs(kw: &SoapyKwargs) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(kw.size);
    for j in 0..kw.size {
        let key = unsafe { CStr::from_ptr(*kw.keys.add(j)).to_string_lossy().to_string() };
        let val = unsafe { CStr::from_ptr(*kw.vals.add(j)).to_string_lossy().to_string() };
        pairs.push((key, val));
    }
    pairs
}

/// Enumerate devices SoapySDR knows about, as key=value descriptor strings.
pub fn list_devices() -> Vec<String> {
    let mut length: usize = 0;
    let results = unsafe { SoapySDRDevice_enumerate(ptr::null(), &mut length) };

    if results.is_null() || length == 0 {
        return Vec::new();
    }

    let mut devices = Vec::with_capacity(length);
    for i in 0..length {
        let kw = unsafe { &*results.add(i) };
        let line = kwargs_pairs(kw)
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        devices.push(line);
    }

    unsafe { SoapySDRKwargsList_clear(results, length) };
    devices
}

/// Decode stream flags for debug logs.
fn describe_flags(flags: c_int) -> String {
    const NAMES: [(c_int, &str); 6] = [
        (1 << 1, "end-burst"),
        (1 << 2, "has-time"),
        (1 << 3, "end-abrupt"),
        (1 << 4, "one-packet"),
        (1 << 5, "more-fragments"),
        (1 << 6, "wait-trigger"),
    ];
    let mut out = String::new();
    for (bit, name) in NAMES {
        if flags & bit != 0 {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(name);
        }
    }
    out
}

/// A receiver opened through SoapySDR. One RX stream at a time.
pub struct SoapyRadio {
    dev: *mut SoapyDevice,
    stream: *mut SoapyStream,
    stream_channel: usize,
}

// The raw device handle is only ever touched from the thread that owns the
// SoapyRadio; Soapy itself serialises hardware access.
unsafe impl Send for SoapyRadio {}

impl SoapyRadio {
    /// Open a device by its SoapySDR args string. An empty string lets
    /// SoapySDR pick the first available device.
    pub fn open(name: &str) -> Result<Self, SdrError> {
        let c_name = CString::new(name).map_err(|_| SdrError::DeviceNotFound(name.to_string()))?;
        let dev = unsafe { SoapySDRDevice_makeStrArgs(c_name.as_ptr()) };
        if dev.is_null() {
            log::error!("SoapySDR error: {}", last_error());
            return Err(SdrError::DeviceNotFound(name.to_string()));
        }

        let radio = Self {
            dev,
            stream: ptr::null_mut(),
            stream_channel: 0,
        };
        radio.log_hardware_info();
        Ok(radio)
    }

    fn log_hardware_info(&self) {
        let kw = unsafe { SoapySDRDevice_getHardwareInfo(self.dev) };
        for (key, val) in kwargs_pairs(&kw) {
            log::debug!("device info: {}\t{}", key, val);
        }
    }

    /// Log any channel information variables the driver exposes.
    pub fn log_channel_info(&self, channel: usize) {
        let kw = unsafe { SoapySDRDevice_getChannelInfo(self.dev, SOAPY_SDR_RX, channel) };
        for (key, val) in kwargs_pairs(&kw) {
            log::debug!("channel {} info: {}={}", channel, key, val);
        }
    }
}

impl Radio for SoapyRadio {
    fn driver(&self) -> &str {
        "soapysdr"
    }

    fn channel_count(&self) -> usize {
        unsafe { SoapySDRDevice_getNumChannels(self.dev, SOAPY_SDR_RX) }
    }

    fn sample_rates(&self, channel: usize) -> Result<Vec<f64>, SdrError> {
        let mut length: usize = 0;
        let rates = unsafe {
            SoapySDRDevice_listSampleRates(self.dev, SOAPY_SDR_RX, channel, &mut length)
        };
        if rates.is_null() {
            return Err(SdrError::Driver(last_error()));
        }
        let mut out = Vec::with_capacity(length);
        for i in 0..length {
            out.push(unsafe { *rates.add(i) });
        }
        unsafe { free(rates as *mut c_void) };
        Ok(out)
    }

    fn native_format(&self, channel: usize) -> Result<(String, f64), SdrError> {
        let mut full_scale: c_double = 0.0;
        let fmt = unsafe {
            SoapySDRDevice_getNativeStreamFormat(self.dev, SOAPY_SDR_RX, channel, &mut full_scale)
        };
        if fmt.is_null() {
            return Err(SdrError::Driver(last_error()));
        }
        let fmt = unsafe { CStr::from_ptr(fmt).to_string_lossy().to_string() };
        Ok((fmt, full_scale))
    }

    fn set_sample_rate(&mut self, channel: usize, rate: f64) -> Result<(), SdrError> {
        let r = unsafe { SoapySDRDevice_setSampleRate(self.dev, SOAPY_SDR_RX, channel, rate) };
        if r != 0 {
            return Err(SdrError::Driver(last_error()));
        }
        Ok(())
    }

    fn set_gain(&mut self, channel: usize, gain_db: f64) -> Result<(), SdrError> {
        let r = unsafe { SoapySDRDevice_setGain(self.dev, SOAPY_SDR_RX, channel, gain_db) };
        if r != 0 {
            return Err(SdrError::Driver(last_error()));
        }
        Ok(())
    }

    fn set_frequency(&mut self, channel: usize, frequency: Frequency) -> Result<(), SdrError> {
        let r = unsafe {
            SoapySDRDevice_setFrequency(
                self.dev,
                SOAPY_SDR_RX,
                channel,
                frequency as f64,
                ptr::null(),
            )
        };
        if r != 0 {
            return Err(SdrError::Driver(last_error()));
        }
        Ok(())
    }

    fn start_stream(&mut self, channel: usize) -> Result<(), SdrError> {
        let channels = self.channel_count();
        if channel >= channels {
            return Err(SdrError::InvalidChannel {
                requested: channel,
                available: channels,
            });
        }

        let fmt = CString::new("CS16").unwrap();
        let stream = unsafe {
            SoapySDRDevice_setupStream(
                self.dev,
                SOAPY_SDR_RX,
                fmt.as_ptr(),
                &channel,
                1,
                ptr::null(),
            )
        };
        if stream.is_null() {
            return Err(SdrError::Driver(last_error()));
        }

        let r = unsafe { SoapySDRDevice_activateStream(self.dev, stream, 0, 0, 0) };
        if r != 0 {
            unsafe { SoapySDRDevice_closeStream(self.dev, stream) };
            return Err(SdrError::Driver(last_error()));
        }

        self.stream = stream;
        self.stream_channel = channel;
        log::debug!("RX stream active on channel {}", channel);
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<ReadBlock, SdrError> {
        if self.stream.is_null() {
            return Err(SdrError::StreamInactive);
        }

        let max_pairs = buf.len() / 2;
        let mut flags: c_int = 0;
        let mut time_ns: c_longlong = 0;
        let buf_ptr = buf.as_mut_ptr() as *mut c_void;

        let ret = unsafe {
            SoapySDRDevice_readStream(
                self.dev,
                self.stream,
                &buf_ptr,
                max_pairs,
                &mut flags,
                &mut time_ns,
                READ_TIMEOUT_US,
            )
        };
        if ret < 0 {
            return Err(SdrError::Read { code: ret });
        }

        let hardware_time = flags & SOAPY_SDR_HAS_TIME != 0;
        let timestamp_us: ClockTime = if hardware_time {
            time_ns / 1000
        } else {
            clock_time()
        };
        if flags != 0 {
            log::trace!("read flags: {}", describe_flags(flags));
        }

        Ok(ReadBlock {
            pairs: ret as usize,
            timestamp_us,
            hardware_time,
        })
    }

    fn stop_stream(&mut self) {
        if !self.stream.is_null() {
            unsafe {
                SoapySDRDevice_deactivateStream(self.dev, self.stream, 0, 0);
                SoapySDRDevice_closeStream(self.dev, self.stream);
            }
            self.stream = ptr::null_mut();
        }
    }
}

impl Drop for SoapyRadio {
    fn drop(&mut self) {
        self.stop_stream();
        unsafe { SoapySDRDevice_unmake(self.dev) };
    }
}
