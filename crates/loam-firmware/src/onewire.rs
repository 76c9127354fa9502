//! Bit-banged 1-Wire master on a single GPIO
//!
//! The line idles high through the external pull-up. Driving low enables
//! the output (preset low); releasing disables it again, so the pin never
//! drives the line high.

use esp_hal::delay::Delay;
use esp_hal::gpio::Flex;
use loam_core::sensors::OneWireBus;

pub struct OneWirePin<'d> {
    pin: Flex<'d>,
    delay: Delay,
}

impl<'d> OneWirePin<'d> {
    pub fn new(mut pin: Flex<'d>) -> Self {
        pin.set_low();
        pin.set_input_enable(true);
        pin.set_output_enable(false);
        Self {
            pin,
            delay: Delay::new(),
        }
    }

    #[inline(always)]
    fn drive_low(&mut self) {
        self.pin.set_output_enable(true);
    }

    #[inline(always)]
    fn release(&mut self) {
        self.pin.set_output_enable(false);
    }

    /// Each slot runs inside a critical section: an interrupt in the middle
    /// of a slot stretches it past the protocol timing.
    fn write_bit(&mut self, bit: bool) {
        critical_section::with(|_| {
            self.drive_low();
            if bit {
                self.delay.delay_micros(6);
                self.release();
                self.delay.delay_micros(64);
            } else {
                self.delay.delay_micros(60);
                self.release();
                self.delay.delay_micros(10);
            }
        });
    }

    fn read_bit(&mut self) -> bool {
        critical_section::with(|_| {
            self.drive_low();
            self.delay.delay_micros(6);
            self.release();
            self.delay.delay_micros(9);
            let bit = self.pin.is_high();
            self.delay.delay_micros(55);
            bit
        })
    }
}

impl OneWireBus for OneWirePin<'_> {
    fn reset(&mut self) -> bool {
        critical_section::with(|_| {
            self.drive_low();
            self.delay.delay_micros(480);
            self.release();
            self.delay.delay_micros(70);
            let presence = self.pin.is_low();
            self.delay.delay_micros(410);
            presence
        })
    }

    fn write_byte(&mut self, byte: u8) {
        for i in 0..8 {
            self.write_bit((byte >> i) & 0x01 != 0);
        }
    }

    fn read_byte(&mut self) -> u8 {
        let mut byte = 0;
        for i in 0..8 {
            if self.read_bit() {
                byte |= 1 << i;
            }
        }
        byte
    }
}
